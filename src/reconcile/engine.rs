//! Reconciliation engine.
//!
//! Two entry points drive the state machine:
//!
//! - [`ReconciliationEngine::revert_and_enforce`]: full sweep. Removes
//!   invalid cookies, then writes every policy cookie that is missing or
//!   wrong.
//! - [`ReconciliationEngine::handle`]: one cookie store event. Restores
//!   removed opt-out cookies after a delay, removes wrong values, and
//!   unlocks keys once a write is confirmed.
//!
//! The engine never spawns. Recreations are queued as
//! [`DeferredRecreate`] values; the caller sleeps until
//! [`next_deadline`](ReconciliationEngine::next_deadline) and then calls
//! [`run_due`](ReconciliationEngine::run_due).
//!
//! # Feedback loops
//!
//! The store reports a write as removal-then-addition. Before each
//! corrective write the engine locks `(name, domain)`; a removal of a
//! valid cookie under a locked key is the first half of that write and is
//! ignored. The confirming addition unlocks the key.

use crate::base::opterror::OptOutError;
use crate::cookies::canonical_cookie::CanonicalCookie;
use crate::cookies::store::{ChangeCause, CookieChange, CookieEvent, CookieFilter, CookieStore};
use crate::policy::classifier::{Classification, CookieClassifier};
use crate::policy::registry::{Policy, PolicyRegistry};
use crate::reconcile::config::EngineConfig;
use crate::reconcile::mutationlock::MutationLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;

/// A recreation scheduled after a valid cookie was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRecreate {
    /// The removed cookie, as reported by the store.
    pub cookie: CanonicalCookie,
    pub due: Instant,
}

/// Counters from a sweep or a batch of recreations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Cookies enumerated from the store.
    pub examined: usize,
    /// Invalid cookies removed.
    pub removed: usize,
    /// Invalid cookies left alone on a protected domain.
    pub protected: usize,
    /// Policy cookies written.
    pub writes: usize,
    /// Policy cookies already present with the right value.
    pub already_present: usize,
    /// Policies skipped because a write was outstanding.
    pub skipped_locked: usize,
    /// Store calls that failed.
    pub failures: usize,
}

/// What the engine did with one cookie change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// No policy covers the cookie.
    Ignored,
    /// A valid cookie was removed; recreation queued for `due`.
    Scheduled(Instant),
    /// A valid cookie was removed while its key was locked.
    SuppressedLocked,
    /// An invalid cookie was added and has been removed.
    Removed,
    /// Removing an invalid cookie failed.
    RemoveFailed,
    /// A valid cookie was added; its key is unlocked.
    Unlocked,
    /// Nothing to do (e.g. an invalid cookie went away).
    NoAction,
}

/// What the engine did with one store event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Changed(ChangeOutcome),
    Batch(Vec<ChangeOutcome>),
    Swept(SweepReport),
}

/// Keeps one cookie store in line with a policy registry.
pub struct ReconciliationEngine<S> {
    registry: Arc<PolicyRegistry>,
    store: S,
    config: EngineConfig,
    locks: MutationLock,
    deferred: VecDeque<DeferredRecreate>,
}

impl<S: CookieStore> ReconciliationEngine<S> {
    pub fn new(registry: Arc<PolicyRegistry>, store: S, config: EngineConfig) -> Self {
        Self {
            registry,
            store,
            config,
            locks: MutationLock::new(),
            deferred: VecDeque::new(),
        }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &MutationLock {
        &self.locks
    }

    pub fn locks_mut(&mut self) -> &mut MutationLock {
        &mut self.locks
    }

    /// Recreations not yet run, in scheduling order.
    pub fn pending_recreates(&self) -> impl Iterator<Item = &DeferredRecreate> + '_ {
        self.deferred.iter()
    }

    /// Earliest pending recreation deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deferred.iter().map(|d| d.due).min()
    }

    /// Full sweep: remove invalid cookies, then assert every policy.
    pub async fn revert_and_enforce(&mut self) -> SweepReport {
        let mut report = SweepReport::default();

        let cookies = match self.store.get_all(&CookieFilter::default()).await {
            Ok(cookies) => cookies,
            Err(e) => {
                tracing::warn!(error = %e, "Cookie enumeration failed; enforcing policies only");
                report.failures += 1;
                Vec::new()
            }
        };

        for cookie in &cookies {
            report.examined += 1;
            let classifier = CookieClassifier::new(cookie);
            if !classifier.classify(&self.registry).is_invalid() {
                continue;
            }

            if self.config.is_protected(&cookie.domain) {
                tracing::debug!(name = %cookie.name, domain = %cookie.domain, "Keeping invalid cookie on protected domain");
                report.protected += 1;
                continue;
            }

            tracing::debug!(name = %cookie.name, domain = %cookie.domain, "Removing invalid cookie");
            match self.remove_cookie(cookie).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(name = %cookie.name, domain = %cookie.domain, error = %e, "Removal failed");
                    report.failures += 1;
                }
            }
        }

        let registry = Arc::clone(&self.registry);
        for (_, policies) in registry.domains() {
            for policy in PolicyRegistry::effective(policies) {
                self.enforce_policy(policy, &mut report).await;
            }
        }

        tracing::info!(
            examined = report.examined,
            removed = report.removed,
            writes = report.writes,
            skipped_locked = report.skipped_locked,
            failures = report.failures,
            "Sweep complete"
        );
        report
    }

    /// Resynchronize after change events were dropped.
    ///
    /// The lost events may include confirmations of the engine's own
    /// writes, so no lock can be trusted. The lock table is cleared and a
    /// full sweep re-asserts every policy.
    pub async fn recover_from_lag(&mut self, missed: u64) -> SweepReport {
        tracing::warn!(
            missed,
            locks = self.locks.len(),
            "Cookie events dropped; clearing locks and sweeping"
        );
        self.locks.clear();
        self.revert_and_enforce().await
    }

    /// Route one store event.
    pub async fn handle(&mut self, event: &CookieEvent) -> EventOutcome {
        match event {
            CookieEvent::Changed(change) => EventOutcome::Changed(self.on_cookie_changed(change).await),
            CookieEvent::BatchRemoved(cookies) => {
                let mut outcomes = Vec::with_capacity(cookies.len());
                for cookie in cookies {
                    let change = CookieChange::removed(cookie.clone(), ChangeCause::Explicit);
                    outcomes.push(self.on_cookie_changed(&change).await);
                }
                EventOutcome::Batch(outcomes)
            }
            CookieEvent::Cleared => {
                tracing::info!("Cookie store cleared; sweeping");
                EventOutcome::Swept(self.revert_and_enforce().await)
            }
        }
    }

    /// Handle a single cookie addition or removal.
    pub async fn on_cookie_changed(&mut self, change: &CookieChange) -> ChangeOutcome {
        let cookie = &change.cookie;
        let classifier = CookieClassifier::new(cookie);
        let verdict = classifier.classify(&self.registry);

        if verdict == Classification::Irrelevant {
            tracing::trace!(name = %cookie.name, domain = %cookie.domain, "Irrelevant cookie");
            return ChangeOutcome::Ignored;
        }

        tracing::debug!(
            name = %cookie.name,
            domain = %cookie.domain,
            removed = change.removed,
            cause = ?change.cause,
            verdict = ?verdict,
            "Checking cookie"
        );

        match (change.removed, verdict) {
            (true, Classification::Valid) => {
                if self.locks.is_locked(&cookie.name, &cookie.domain) {
                    tracing::debug!(name = %cookie.name, domain = %cookie.domain, "Removal of locked cookie; write pending");
                    return ChangeOutcome::SuppressedLocked;
                }

                let due = Instant::now() + self.config.recreate_delay();
                tracing::debug!(name = %cookie.name, domain = %cookie.domain, delay_ms = self.config.recreate_delay_ms, "Valid cookie removed; recreating");
                self.deferred.push_back(DeferredRecreate {
                    cookie: cookie.clone(),
                    due,
                });
                ChangeOutcome::Scheduled(due)
            }
            (false, Classification::Invalid) => {
                tracing::debug!(name = %cookie.name, domain = %cookie.domain, value = %cookie.value, "Invalid cookie added; removing");
                self.locks.lock(&cookie.name, &cookie.domain);
                match self.remove_cookie(cookie).await {
                    Ok(()) => ChangeOutcome::Removed,
                    Err(e) => {
                        tracing::warn!(name = %cookie.name, domain = %cookie.domain, error = %e, "Removal failed");
                        ChangeOutcome::RemoveFailed
                    }
                }
            }
            (false, Classification::Valid) => {
                self.locks.unlock(&cookie.name, &cookie.domain);
                ChangeOutcome::Unlocked
            }
            _ => ChangeOutcome::NoAction,
        }
    }

    /// Run every recreation due at or before `now`.
    pub async fn run_due(&mut self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        let (due, pending): (VecDeque<_>, VecDeque<_>) =
            self.deferred.drain(..).partition(|d| d.due <= now);
        self.deferred = pending;

        for task in due {
            self.recreate(&task.cookie, &mut report).await;
        }
        report
    }

    async fn recreate(&mut self, cookie: &CanonicalCookie, report: &mut SweepReport) {
        // The key may have been locked since scheduling.
        if self.locks.is_locked(&cookie.name, &cookie.domain) {
            tracing::debug!(name = %cookie.name, domain = %cookie.domain, "Recreation skipped; write pending");
            report.skipped_locked += 1;
            return;
        }

        let registry = Arc::clone(&self.registry);
        let Some(policies) = registry.resolve(&cookie.domain) else {
            return;
        };
        for policy in PolicyRegistry::effective(policies) {
            self.enforce_policy(policy, report).await;
        }
    }

    /// Write `policy`'s cookie if the store lacks it or holds a different value.
    async fn enforce_policy(&mut self, policy: &Policy, report: &mut SweepReport) {
        if self.locks.is_locked(&policy.name, &policy.domain) {
            tracing::debug!(name = %policy.name, domain = %policy.domain, "Write already pending");
            report.skipped_locked += 1;
            return;
        }

        match self.store.get(&policy.name, &policy.url).await {
            Ok(Some(current)) if current.value == policy.value => {
                report.already_present += 1;
                return;
            }
            Ok(Some(current)) => {
                tracing::debug!(name = %policy.name, domain = %policy.domain, expected = %policy.value, found = %current.value, "Malformed opt-out cookie");
            }
            Ok(None) => {
                tracing::debug!(name = %policy.name, domain = %policy.domain, "Missing opt-out cookie");
            }
            Err(e) => {
                tracing::warn!(name = %policy.name, domain = %policy.domain, error = %e, "Lookup failed");
                report.failures += 1;
                return;
            }
        }

        self.locks.lock(&policy.name, &policy.domain);
        match self.store.set(&policy.url, policy.to_cookie()).await {
            Ok(()) => report.writes += 1,
            Err(e) => {
                // No confirming event will arrive for a rejected write.
                tracing::warn!(name = %policy.name, domain = %policy.domain, error = %e, "Write failed");
                self.locks.unlock(&policy.name, &policy.domain);
                report.failures += 1;
            }
        }
    }

    async fn remove_cookie(&self, cookie: &CanonicalCookie) -> Result<(), OptOutError> {
        let url = cookie.url()?;
        self.store.remove(&cookie.name, &url).await
    }
}
