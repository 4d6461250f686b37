//! Events dispatched to the worker and the pending-work registry that keeps
//! it alive while they settle.

use std::future::Future;

use bytes::Bytes;
use futures::future::{join_all, BoxFuture, FutureExt};
use rufingo_net::Request;

use crate::notification::Notification;
use crate::Result;

/// Work registered through `wait_until`.
pub type PendingWork = BoxFuture<'static, Result<()>>;

/// Events the host dispatches.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Push(Option<Bytes>),
    NotificationClick(Notification),
}

impl WorkerEvent {
    /// Event name as used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Push(_) => "push",
            WorkerEvent::NotificationClick(_) => "notificationclick",
        }
    }
}

/// An event whose lifetime can be extended by registering futures.
#[derive(Default)]
pub struct ExtendableEvent {
    pending: Vec<PendingWork>,
}

impl std::fmt::Debug for ExtendableEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendableEvent")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the worker alive until `work` settles.
    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.pending.push(work.boxed());
    }

    /// Number of registered futures.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Hand the registered work to whoever owns the worker's lifetime.
    pub fn into_pending(self) -> Vec<PendingWork> {
        self.pending
    }

    /// Drive every registered future to completion. All of them run even if
    /// one fails; the first error is returned.
    pub async fn settle(self) -> Result<()> {
        join_all(self.pending)
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()
            .map(|_| ())
    }
}

/// A fetch event: the intercepted request plus its extendable lifetime.
#[derive(Debug)]
pub struct FetchEvent {
    pub request: Request,
    extend: ExtendableEvent,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extend: ExtendableEvent::new(),
        }
    }

    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.extend.wait_until(work);
    }

    pub fn into_pending(self) -> Vec<PendingWork> {
        self.extend.into_pending()
    }
}

/// A push event carrying an optional opaque payload.
#[derive(Debug)]
pub struct PushEvent {
    data: Option<Bytes>,
    extend: ExtendableEvent,
}

impl PushEvent {
    pub fn new(data: Option<Bytes>) -> Self {
        Self {
            data,
            extend: ExtendableEvent::new(),
        }
    }

    /// Raw payload, if the push carried one.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.extend.wait_until(work);
    }

    pub async fn settle(self) -> Result<()> {
        self.extend.settle().await
    }
}

/// A click on a displayed notification.
#[derive(Debug)]
pub struct NotificationClickEvent {
    pub notification: Notification,
    extend: ExtendableEvent,
}

impl NotificationClickEvent {
    pub fn new(notification: Notification) -> Self {
        Self {
            notification,
            extend: ExtendableEvent::new(),
        }
    }

    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.extend.wait_until(work);
    }

    pub async fn settle(self) -> Result<()> {
        self.extend.settle().await
    }
}
