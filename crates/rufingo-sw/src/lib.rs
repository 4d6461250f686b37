//! # Rufingo Service Worker
//!
//! Offline cache and push notification worker for the Rufingo flashcard app.
//!
//! ## Features
//!
//! - **Lifecycle**: install precaches the app shell into a versioned bucket,
//!   activate deletes every other bucket
//! - **Fetch Interception**: cache-first or network-first-with-fallback,
//!   selected per build through [`WorkerConfig`]
//! - **Push**: payload decoding with defaults, system notification display
//! - **Notification Click**: close, then focus an existing window or open one
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerHost
//!     ├── ServiceWorkerRegistration (installing / waiting / active)
//!     ├── pending work (JoinSet) ── wait_until_idle()
//!     └── WorkerContext
//!             ├── WorkerConfig
//!             ├── CacheStorage ── Cache ── request identity → CacheEntry
//!             ├── Clients (open windows)
//!             ├── Fetch (network)
//!             └── NotificationSink
//! ```

use rufingo_common::RufingoError;
use rufingo_net::NetError;
use thiserror::Error;

pub mod cache;
pub mod click;
pub mod clients;
pub mod config;
pub mod event;
pub mod host;
pub mod intercept;
pub mod lifecycle;
pub mod notification;
pub mod push;
pub mod registration;

pub use cache::{Cache, CacheEntry, CacheStorage};
pub use click::ClickOutcome;
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{CacheStrategy, ClickBehavior, NotificationDefaults, WorkerConfig};
pub use event::{ExtendableEvent, FetchEvent, NotificationClickEvent, PushEvent, WorkerEvent};
pub use host::{EventOutcome, ServiceWorkerHost, WorkerContext};
pub use notification::{
    Notification, NotificationData, NotificationDescriptor, NotificationId, NotificationSink,
    NotificationTray,
};
pub use push::PushMessage;
pub use registration::{ServiceWorker, ServiceWorkerRegistration, ServiceWorkerState};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Common(#[from] RufingoError),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
