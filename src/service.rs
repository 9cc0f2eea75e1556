//! Startup and event-loop driver.
//!
//! [`OptOutService::init`] loads the registry, subscribes to the store,
//! and runs one sweep. The returned [`OptOutDriver`] then feeds store
//! events and recreation deadlines to the engine one at a time.
//!
//! If the registry fails to load nothing is enforced: no sweep, no
//! subscription. The failure is visible through [`OptOutService::status`].

use crate::base::opterror::OptOutError;
use crate::cookies::monster::CookieMonster;
use crate::cookies::store::{CookieEvent, CookieStore};
use crate::policy::feed::RegistrySource;
use crate::policy::registry::PolicyRegistry;
use crate::reconcile::config::EngineConfig;
use crate::reconcile::engine::{ReconciliationEngine, SweepReport};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

/// Registry lifecycle as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryStatus {
    Loading,
    Ready { domains: usize, policies: usize },
    Failed(String),
}

impl RegistryStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, RegistryStatus::Ready { .. })
    }
}

/// Not-yet-started enforcement for one cookie store.
pub struct OptOutService<S> {
    store: S,
    config: EngineConfig,
    status: watch::Sender<RegistryStatus>,
}

impl OptOutService<CookieMonster> {
    /// Service over a fresh in-memory store sized from `config`.
    pub fn in_memory(config: EngineConfig) -> Self {
        let store = CookieMonster::with_capacity(config.event_capacity);
        Self::new(store, config)
    }
}

impl<S: CookieStore> OptOutService<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        let (status, _) = watch::channel(RegistryStatus::Loading);
        Self {
            store,
            config,
            status,
        }
    }

    /// Watch the registry status. Receivers outlive a failed `init`.
    pub fn status(&self) -> watch::Receiver<RegistryStatus> {
        self.status.subscribe()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the registry from `source`, run the startup sweep and hand
    /// back the driver.
    pub async fn init(self, source: &dyn RegistrySource) -> Result<OptOutDriver<S>, OptOutError> {
        self.config.validate()?;
        self.status.send_replace(RegistryStatus::Loading);

        let registry = match PolicyRegistry::load(source).await {
            Ok(registry) => registry,
            Err(e) => {
                tracing::error!(source = %source.describe(), error = %e, "Policy registry failed to load; not enforcing");
                self.status.send_replace(RegistryStatus::Failed(e.to_string()));
                return Err(e);
            }
        };

        self.status.send_replace(RegistryStatus::Ready {
            domains: registry.domain_count(),
            policies: registry.policy_count(),
        });

        // Subscribe before sweeping so confirmations of the sweep's own
        // writes are seen.
        let events = self.store.subscribe();
        let mut engine = ReconciliationEngine::new(Arc::new(registry), self.store, self.config);
        let initial_sweep = engine.revert_and_enforce().await;

        Ok(OptOutDriver {
            engine,
            events,
            initial_sweep,
            _status: self.status,
        })
    }
}

/// Running enforcement: the engine plus its event subscription.
pub struct OptOutDriver<S> {
    engine: ReconciliationEngine<S>,
    events: broadcast::Receiver<CookieEvent>,
    initial_sweep: SweepReport,
    // Keeps status receivers connected.
    _status: watch::Sender<RegistryStatus>,
}

impl<S: CookieStore> OptOutDriver<S> {
    pub fn engine(&self) -> &ReconciliationEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ReconciliationEngine<S> {
        &mut self.engine
    }

    /// Counters from the sweep run by `init`.
    pub fn initial_sweep(&self) -> SweepReport {
        self.initial_sweep
    }

    /// Process events and deadlines until `shutdown` resolves or the store
    /// goes away. Returns the engine for inspection.
    pub async fn run_until<F>(mut self, shutdown: F) -> ReconciliationEngine<S>
    where
        F: Future,
    {
        tokio::pin!(shutdown);

        loop {
            let deadline = self.engine.next_deadline();

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutting down opt-out enforcement");
                    break;
                }
                received = self.events.recv() => match received {
                    Ok(event) => {
                        self.engine.handle(&event).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        self.engine.recover_from_lag(missed).await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Cookie store closed its event stream");
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.engine.run_due(Instant::now()).await;
                }
            }
        }

        self.engine
    }

    /// Handle every event already queued, without waiting for more.
    /// Returns the number of events handled.
    pub async fn drain_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.engine.handle(&event).await;
                    handled += 1;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    self.engine.recover_from_lag(missed).await;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        handled
    }
}
