//! Event dispatch and worker lifetime.

use std::sync::Arc;

use rufingo_net::{Fetch, Request, Response};
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::event::{ExtendableEvent, FetchEvent, NotificationClickEvent, PushEvent, WorkerEvent};
use crate::notification::{Notification, NotificationSink};
use crate::registration::{ServiceWorkerRegistration, ServiceWorkerState};
use crate::{click, intercept, lifecycle, push, Result, ServiceWorkerError};

/// Everything a handler may touch. Cheap to clone; handlers move clones
/// into the work they register.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<WorkerConfig>,
    pub caches: Arc<RwLock<CacheStorage>>,
    pub clients: Arc<RwLock<Clients>>,
    pub network: Arc<dyn Fetch>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl WorkerContext {
    /// Context with empty cache storage and no open windows.
    pub fn new(
        config: WorkerConfig,
        network: Arc<dyn Fetch>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        let clients = Clients::new(config.origin.clone());
        Self {
            config: Arc::new(config),
            caches: Arc::new(RwLock::new(CacheStorage::new())),
            clients: Arc::new(RwLock::new(clients)),
            network,
            notifications,
        }
    }

    /// Use previously persisted cache storage.
    pub fn with_caches(mut self, caches: CacheStorage) -> Self {
        self.caches = Arc::new(RwLock::new(caches));
        self
    }

    /// Share a window registry with the embedding host.
    pub fn with_clients(mut self, clients: Arc<RwLock<Clients>>) -> Self {
        self.clients = clients;
        self
    }

    /// Name of the current cache generation.
    pub fn cache_name(&self) -> String {
        self.config.cache_name()
    }
}

/// Result of dispatching one event.
#[derive(Debug)]
pub enum EventOutcome {
    /// The event's work has settled.
    Done,
    /// A fetch was answered.
    Response(Response),
}

/// Runs one worker: owns its registration state and every piece of work
/// still in flight.
pub struct ServiceWorkerHost {
    ctx: WorkerContext,
    registration: RwLock<ServiceWorkerRegistration>,
    inflight: Mutex<JoinSet<Result<()>>>,
}

impl ServiceWorkerHost {
    pub fn new(ctx: WorkerContext) -> Self {
        let registration = ServiceWorkerRegistration::new(ctx.config.origin.clone());
        Self {
            ctx,
            registration: RwLock::new(registration),
            inflight: Mutex::new(JoinSet::new()),
        }
    }

    /// Host for a worker restarted over persisted caches. When the storage
    /// records the current generation as active and still holds its bucket,
    /// the worker is active at once and serves from it; otherwise it has to
    /// install like a fresh one.
    pub async fn resume(ctx: WorkerContext) -> Self {
        let host = Self::new(ctx);
        let cache_name = host.ctx.cache_name();
        let stored = host.ctx.caches.read().await.active().map(str::to_string);

        match stored {
            Some(active) if active == cache_name => {
                host.registration.write().await.resume(&cache_name);
                info!(cache = %cache_name, "Resumed active worker from stored caches");
            }
            Some(active) => {
                debug!(stored = %active, current = %cache_name, "Stored generation is another version");
            }
            None => debug!(cache = %cache_name, "No active generation stored"),
        }
        host
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// State of the active worker, if any.
    pub async fn active_state(&self) -> Option<ServiceWorkerState> {
        self.registration.read().await.get_active().map(|w| w.state)
    }

    /// Cache generation owned by the active worker.
    pub async fn active_cache_name(&self) -> Option<String> {
        self.registration
            .read()
            .await
            .get_active()
            .map(|w| w.cache_name.clone())
    }

    /// Whether an installed worker is waiting to activate.
    pub async fn has_waiting(&self) -> bool {
        self.registration.read().await.waiting.is_some()
    }

    /// Dispatch any event.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        debug!(event = event.kind(), "Dispatching event");
        match event {
            WorkerEvent::Install => self.install().await.map(|_| EventOutcome::Done),
            WorkerEvent::Activate => self.activate().await.map(|_| EventOutcome::Done),
            WorkerEvent::Fetch(request) => self.fetch(request).await.map(EventOutcome::Response),
            WorkerEvent::Push(data) => self.push(data).await.map(|_| EventOutcome::Done),
            WorkerEvent::NotificationClick(notification) => self
                .notification_click(notification)
                .await
                .map(|_| EventOutcome::Done),
        }
    }

    /// Install this version. On failure the installing worker is dropped and
    /// the previously active worker keeps running.
    pub async fn install(&self) -> Result<()> {
        let cache_name = self.ctx.cache_name();
        self.registration.write().await.begin_install(&cache_name);

        let mut event = ExtendableEvent::new();
        lifecycle::on_install(&self.ctx, &mut event);

        if let Err(err) = event.settle().await {
            let message = err.to_string();
            warn!(cache = %cache_name, error = %message, "Install failed");
            self.registration.write().await.install_failed(&message);
            return Err(match err {
                failed @ ServiceWorkerError::InstallFailed(_) => failed,
                other => ServiceWorkerError::InstallFailed(other.to_string()),
            });
        }

        self.registration.write().await.install_complete();
        info!(cache = %cache_name, "Service worker installed");

        if self.ctx.config.skip_waiting {
            debug!("Skipping waiting phase");
            self.activate().await?;
        }
        Ok(())
    }

    /// Activate the waiting worker.
    ///
    /// The new worker is active even if the activate work fails; the error
    /// is still reported to the caller.
    pub async fn activate(&self) -> Result<()> {
        if !self.registration.write().await.begin_activate() {
            return Err(ServiceWorkerError::StateError(
                "No installed worker is waiting to activate".to_string(),
            ));
        }

        let mut event = ExtendableEvent::new();
        lifecycle::on_activate(&self.ctx, &mut event);
        let settled = event.settle().await;

        self.registration.write().await.activate_complete();
        self.ctx.caches.write().await.set_active(&self.ctx.cache_name());
        match settled {
            Ok(()) => {
                info!(cache = %self.ctx.cache_name(), "Service worker activated");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Activate work failed");
                Err(err)
            }
        }
    }

    /// Answer a request. Without an active worker the request goes straight
    /// to the network.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        if self.active_state().await != Some(ServiceWorkerState::Activated) {
            debug!(url = %request.url, "No active worker, passing request through");
            return Ok(self.ctx.network.fetch(request).await?);
        }

        let mut event = FetchEvent::new(request);
        let result = intercept::on_fetch(&self.ctx, &mut event).await;

        let pending = event.into_pending();
        if !pending.is_empty() {
            let mut inflight = self.inflight.lock().await;
            while let Some(joined) = inflight.try_join_next() {
                if let Err(err) = flatten(joined) {
                    warn!(error = %err, "Background work failed");
                }
            }
            for work in pending {
                inflight.spawn(work);
            }
        }

        result
    }

    /// Deliver a push message.
    pub async fn push(&self, data: Option<bytes::Bytes>) -> Result<()> {
        self.require_active().await?;
        let mut event = PushEvent::new(data);
        push::on_push(&self.ctx, &mut event);
        event.settle().await
    }

    /// Deliver a notification click.
    pub async fn notification_click(&self, notification: Notification) -> Result<()> {
        self.require_active().await?;
        let mut event = NotificationClickEvent::new(notification);
        click::on_notification_click(&self.ctx, &mut event);
        event.settle().await
    }

    /// Wait for all background work to settle. After this returns the worker
    /// may be torn down without losing writes. Reports the first failure.
    pub async fn wait_until_idle(&self) -> Result<()> {
        let mut inflight = self.inflight.lock().await;
        let mut first_error = None;

        while let Some(joined) = inflight.join_next().await {
            if let Err(err) = flatten(joined) {
                warn!(error = %err, "Background work failed");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Background work spawned by fetches and not yet collected.
    pub async fn pending_work(&self) -> usize {
        self.inflight.lock().await.len()
    }

    async fn require_active(&self) -> Result<()> {
        match self.active_state().await {
            Some(ServiceWorkerState::Activated) => Ok(()),
            _ => Err(ServiceWorkerError::StateError(
                "No active worker".to_string(),
            )),
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined
        .map_err(|e| ServiceWorkerError::StateError(format!("pending work aborted: {}", e)))
        .and_then(|r| r)
}
