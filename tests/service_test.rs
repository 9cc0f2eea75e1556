//! End-to-end tests: service startup and the event loop driver.

use optoutkeeper::base::opterror::OptOutError;
use optoutkeeper::cookies::canonical_cookie::CanonicalCookie;
use optoutkeeper::cookies::monster::CookieMonster;
use optoutkeeper::cookies::store::CookieStore;
use optoutkeeper::policy::feed::StaticRegistrySource;
use optoutkeeper::reconcile::config::EngineConfig;
use optoutkeeper::service::{OptOutService, RegistryStatus};
use std::time::Duration;
use url::Url;

const FEED: &str = r#"{"registry":[
    {"host":"host","name":"name","value":"value"},
    {"host":"doubleclick.net","name":"id","value":"OPT_OUT","company":"Google"}
]}"#;

async fn value_of(store: &CookieMonster, name: &str) -> Option<String> {
    let url = Url::parse("http://doubleclick.net/").unwrap();
    store.get(name, &url).await.unwrap().map(|c| c.value)
}

#[tokio::test]
async fn test_init_sweeps_and_reports_ready() {
    let store = CookieMonster::new();
    let service = OptOutService::new(store.clone(), EngineConfig::default());
    let status = service.status();

    let driver = service
        .init(&StaticRegistrySource::new(FEED))
        .await
        .unwrap();

    assert_eq!(
        *status.borrow(),
        RegistryStatus::Ready {
            domains: 1,
            policies: 1
        }
    );
    assert_eq!(driver.initial_sweep().writes, 1);
    assert_eq!(value_of(&store, "id").await.as_deref(), Some("OPT_OUT"));
}

#[tokio::test]
async fn test_init_failure_halts_enforcement() {
    let store = CookieMonster::new();
    store.set_canonical_cookie(CanonicalCookie::session("id", "WRONG", ".doubleclick.net"));
    let service = OptOutService::new(store.clone(), EngineConfig::default());
    let status = service.status();

    let err = service
        .init(&StaticRegistrySource::new(r#"{"entries": []}"#))
        .await
        .err()
        .unwrap();

    assert_eq!(err, OptOutError::RegistryMissingCollection);
    assert!(matches!(*status.borrow(), RegistryStatus::Failed(_)));
    // No sweep ran.
    assert_eq!(value_of(&store, "id").await.as_deref(), Some("WRONG"));
}

#[tokio::test]
async fn test_status_starts_loading() {
    let service = OptOutService::in_memory(EngineConfig::default());
    assert_eq!(*service.status().borrow(), RegistryStatus::Loading);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = EngineConfig::default();
    config.event_capacity = 0;
    let service = OptOutService::new(CookieMonster::new(), config);

    let err = service
        .init(&StaticRegistrySource::new(FEED))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, OptOutError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_own_writes_are_confirmed_without_loops() {
    let store = CookieMonster::new();
    let service = OptOutService::new(store.clone(), EngineConfig::default());
    let mut driver = service
        .init(&StaticRegistrySource::new(FEED))
        .await
        .unwrap();
    assert!(driver.engine().locks().is_locked("id", ".doubleclick.net"));

    // The sweep's write arrives as a single addition and unlocks the key.
    assert_eq!(driver.drain_pending().await, 1);
    assert!(driver.engine().locks().is_empty());
    assert_eq!(driver.engine().pending_recreates().count(), 0);
    assert_eq!(driver.drain_pending().await, 0);
}

#[tokio::test]
async fn test_site_overwrite_is_reverted() {
    let store = CookieMonster::new();
    let service = OptOutService::new(store.clone(), EngineConfig::default());
    let mut driver = service
        .init(&StaticRegistrySource::new(FEED))
        .await
        .unwrap();
    driver.drain_pending().await;

    // A site replaces the opt-out value with a tracking id.
    let url = Url::parse("http://ad.doubleclick.net/").unwrap();
    store.parse_and_save_cookie(&url, "id=TRACKING; Domain=doubleclick.net; Path=/");
    driver.drain_pending().await;

    // The wrong value is gone and the removal of the opt-out value queued
    // a recreation, but the key stays locked after removing the intruder.
    assert_eq!(value_of(&store, "id").await, None);
    assert!(driver.engine().locks().is_locked("id", ".doubleclick.net"));
    assert_eq!(driver.engine().pending_recreates().count(), 1);

    // The recreation finds the key locked and does nothing.
    let due = tokio::time::Instant::now() + Duration::from_secs(5);
    let report = driver.engine_mut().run_due(due).await;
    assert_eq!(report.skipped_locked, 1);
    assert_eq!(value_of(&store, "id").await, None);

    // Locks live only in memory; a fresh lock table lets the sweep restore it.
    driver.engine_mut().locks_mut().clear();
    let report = driver.engine_mut().revert_and_enforce().await;
    assert_eq!(report.writes, 1);
    assert_eq!(value_of(&store, "id").await.as_deref(), Some("OPT_OUT"));
}

#[tokio::test(start_paused = true)]
async fn test_driver_recreates_deleted_cookie() {
    let store = CookieMonster::new();
    let service = OptOutService::new(
        store.clone(),
        EngineConfig::default().with_recreate_delay(Duration::from_millis(200)),
    );
    let driver = service
        .init(&StaticRegistrySource::new(FEED))
        .await
        .unwrap();

    let site = store.clone();
    let handle = tokio::spawn(driver.run_until(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        // A site deletes the opt-out cookie.
        let url = Url::parse("http://doubleclick.net/").unwrap();
        site.remove("id", &url).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    }));

    let engine = handle.await.unwrap();

    assert_eq!(value_of(&store, "id").await.as_deref(), Some("OPT_OUT"));
    assert_eq!(engine.pending_recreates().count(), 0);
    assert!(engine.locks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_driver_stops_on_shutdown() {
    let service = OptOutService::in_memory(EngineConfig::default());
    let driver = service
        .init(&StaticRegistrySource::new(FEED))
        .await
        .unwrap();

    let engine = driver
        .run_until(tokio::time::sleep(Duration::from_secs(10)))
        .await;
    assert!(engine.locks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lagged_subscription_releases_stale_locks() {
    let feed = r#"{"registry":[
        {"host":"a1.com","name":"opt","value":"1"},
        {"host":"a2.com","name":"opt","value":"1"},
        {"host":"a3.com","name":"opt","value":"1"},
        {"host":"a4.com","name":"opt","value":"1"},
        {"host":"a5.com","name":"opt","value":"1"}
    ]}"#;
    let store = CookieMonster::with_capacity(2);
    let service = OptOutService::new(store.clone(), EngineConfig::default());
    let mut driver = service
        .init(&StaticRegistrySource::new(feed))
        .await
        .unwrap();
    assert_eq!(driver.initial_sweep().writes, 5);

    // Five confirmations into a two-slot channel: three are lost.
    driver.drain_pending().await;
    assert!(driver.engine().locks().is_empty());

    // A site deletes one opt-out cookie; it must come back.
    let url = Url::parse("http://a1.com/").unwrap();
    store.remove("opt", &url).await.unwrap();
    driver.drain_pending().await;
    assert_eq!(driver.engine().pending_recreates().count(), 1);

    let due = tokio::time::Instant::now() + Duration::from_secs(60);
    let report = driver.engine_mut().run_due(due).await;
    assert_eq!(report.writes, 1);
    assert_eq!(
        store.get("opt", &url).await.unwrap().map(|c| c.value).as_deref(),
        Some("1")
    );

    driver.drain_pending().await;
    assert!(driver.engine().locks().is_empty());
}

#[tokio::test]
async fn test_lagged_subscription_triggers_sweep() {
    let store = CookieMonster::with_capacity(2);
    let service = OptOutService::new(store.clone(), EngineConfig::default());
    let mut driver = service
        .init(&StaticRegistrySource::new(FEED))
        .await
        .unwrap();

    // Flood the channel past its capacity, then drop the opt-out cookie.
    for i in 0..8 {
        store.set_canonical_cookie(CanonicalCookie::session(
            format!("noise{}", i),
            "x",
            ".example.org",
        ));
    }
    let url = Url::parse("http://doubleclick.net/").unwrap();
    store.remove_cookie("id", &url);

    driver.drain_pending().await;

    assert_eq!(value_of(&store, "id").await.as_deref(), Some("OPT_OUT"));
    assert!(driver.engine().locks().is_empty());
}

#[tokio::test]
async fn test_invalid_cookie_on_deeper_path_spares_opt_out() {
    let feed = r#"{"registry":[{"host":".example.com","name":"opt-out","value":"1"}]}"#;
    let store = CookieMonster::new();
    let service = OptOutService::new(store.clone(), EngineConfig::default());
    let mut driver = service
        .init(&StaticRegistrySource::new(feed))
        .await
        .unwrap();
    driver.drain_pending().await;

    let sub = Url::parse("http://example.com/sub").unwrap();
    store.parse_and_save_cookie(&sub, "opt-out=WRONG; Domain=example.com; Path=/sub");
    driver.drain_pending().await;

    // Only the intruder is removed; the root opt-out cookie survives.
    assert_eq!(store.total_cookie_count(), 1);
    let root = Url::parse("http://example.com/").unwrap();
    assert_eq!(
        store.get("opt-out", &root).await.unwrap().map(|c| c.value).as_deref(),
        Some("1")
    );
    assert_eq!(driver.engine().pending_recreates().count(), 0);
}
