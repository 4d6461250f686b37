//! System notifications shown by the worker.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Result;

/// Metadata attached to a notification, read back on click.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: Option<String>,
}

/// Everything needed to render a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDescriptor {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub tag: String,
    pub require_interaction: bool,
    pub data: NotificationData,
}

/// Unique identifier for a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A notification that has been displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub descriptor: NotificationDescriptor,
}

impl Notification {
    /// Wrap a descriptor with a fresh id.
    pub fn new(descriptor: NotificationDescriptor) -> Self {
        Self {
            id: NotificationId::new(),
            descriptor,
        }
    }

    /// URL to navigate to on click; `/` when none is attached.
    pub fn target_url(&self) -> &str {
        self.descriptor
            .data
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or("/")
    }
}

/// Platform notification subsystem.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Display a notification.
    async fn show(&self, descriptor: NotificationDescriptor) -> Result<Notification>;

    /// Remove a notification from the tray. Unknown ids are ignored.
    async fn close(&self, id: NotificationId);
}

/// In-process notification tray.
#[derive(Debug, Default)]
pub struct NotificationTray {
    shown: RwLock<Vec<Notification>>,
}

impl NotificationTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently in the tray, oldest first.
    pub async fn displayed(&self) -> Vec<Notification> {
        self.shown.read().await.clone()
    }

    /// Look up a displayed notification.
    pub async fn get(&self, id: NotificationId) -> Option<Notification> {
        self.shown.read().await.iter().find(|n| n.id == id).cloned()
    }
}

#[async_trait]
impl NotificationSink for NotificationTray {
    async fn show(&self, descriptor: NotificationDescriptor) -> Result<Notification> {
        let notification = Notification::new(descriptor);
        let mut shown = self.shown.write().await;

        let before = shown.len();
        shown.retain(|n| n.descriptor.tag != notification.descriptor.tag);
        if shown.len() != before {
            debug!(tag = %notification.descriptor.tag, "Replaced notification with same tag");
        }

        info!(
            id = ?notification.id,
            title = %notification.descriptor.title,
            "Notification shown"
        );
        shown.push(notification.clone());
        Ok(notification)
    }

    async fn close(&self, id: NotificationId) {
        self.shown.write().await.retain(|n| n.id != id);
        debug!(id = ?id, "Notification closed");
    }
}
