//! Registration bookkeeping: which worker version is installing, waiting or
//! active.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Created, install not started.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and handling events.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

/// A service worker instance, one per cache generation.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    /// Unique ID.
    pub id: ServiceWorkerId,

    /// Cache generation this worker owns.
    pub cache_name: String,

    /// Current state.
    pub state: ServiceWorkerState,

    /// Error message if install failed.
    pub error: Option<String>,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    /// Create a new service worker.
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            cache_name: cache_name.into(),
            state: ServiceWorkerState::Parsed,
            error: None,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        debug!(worker = ?self.id, from = ?self.state, to = ?state, "Worker state change");
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    /// Check if redundant.
    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}

/// A service worker registration.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Installing worker.
    pub installing: Option<ServiceWorker>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<ServiceWorker>,

    /// Active worker.
    pub active: Option<ServiceWorker>,
}

impl ServiceWorkerRegistration {
    /// Create a new registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Get the active worker.
    pub fn get_active(&self) -> Option<&ServiceWorker> {
        self.active.as_ref()
    }

    /// Start installing a new worker for `cache_name`. A previous installing
    /// worker is superseded.
    pub fn begin_install(&mut self, cache_name: &str) -> ServiceWorkerId {
        if let Some(mut old) = self.installing.take() {
            old.set_state(ServiceWorkerState::Redundant);
        }
        let mut worker = ServiceWorker::new(cache_name);
        worker.set_state(ServiceWorkerState::Installing);
        let id = worker.id;
        self.installing = Some(worker);
        id
    }

    /// Transition installing to waiting, replacing any older waiting worker.
    pub fn install_complete(&mut self) {
        if let Some(mut worker) = self.installing.take() {
            worker.set_state(ServiceWorkerState::Installed);
            if let Some(mut old) = self.waiting.replace(worker) {
                old.set_state(ServiceWorkerState::Redundant);
            }
        }
    }

    /// Discard the installing worker. The active worker is untouched.
    pub fn install_failed(&mut self, error: &str) -> Option<ServiceWorker> {
        let mut worker = self.installing.take()?;
        worker.error = Some(error.to_string());
        worker.set_state(ServiceWorkerState::Redundant);
        Some(worker)
    }

    /// Promote the waiting worker to active in the `Activating` state; the
    /// previous active worker becomes redundant. Returns false when nothing
    /// is waiting.
    pub fn begin_activate(&mut self) -> bool {
        let Some(mut worker) = self.waiting.take() else {
            return false;
        };
        worker.set_state(ServiceWorkerState::Activating);

        if let Some(mut old) = self.active.take() {
            old.set_state(ServiceWorkerState::Redundant);
        }

        self.active = Some(worker);
        true
    }

    /// Restore a worker that was activated in an earlier run. It goes
    /// straight to `Activated` without install or activate events.
    pub fn resume(&mut self, cache_name: &str) {
        let mut worker = ServiceWorker::new(cache_name);
        worker.set_state(ServiceWorkerState::Activated);
        if let Some(mut old) = self.active.replace(worker) {
            old.set_state(ServiceWorkerState::Redundant);
        }
    }

    /// Mark the active worker as fully activated.
    pub fn activate_complete(&mut self) {
        if let Some(worker) = self.active.as_mut() {
            worker.set_state(ServiceWorkerState::Activated);
        }
    }
}
