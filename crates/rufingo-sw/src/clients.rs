//! Clients API: the application windows the worker can see.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use url::Url;

use crate::{Result, ServiceWorkerError};

/// A client (open page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL, exactly as reported by the platform.
    pub url: String,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

impl Client {
    /// Create an uncontrolled, unfocused window client.
    pub fn window(url: impl Into<String>) -> Self {
        Self {
            id: next_client_id(),
            url: url.into(),
            client_type: ClientType::Window,
            focused: false,
            controlled: false,
        }
    }

    /// Whether the client can take focus.
    pub fn is_focusable(&self) -> bool {
        self.client_type == ClientType::Window
    }
}

/// Options for `clients.matchAll()`.
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Clients API.
#[derive(Debug)]
pub struct Clients {
    /// Base used to validate URLs passed to `open_window`.
    base: Url,

    /// Clients in platform enumeration order.
    clients: Vec<Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new(base: Url) -> Self {
        Self {
            base,
            clients: Vec::new(),
        }
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    /// Match all clients, in enumeration order.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<Client> {
        self.clients
            .iter()
            .filter(|c| options.include_uncontrolled || c.controlled)
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .cloned()
            .collect()
    }

    /// Focus a client, blurring every other one.
    pub fn focus(&mut self, id: &str) -> Result<Client> {
        let target = self
            .get(id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {}", id)))?;
        if !target.is_focusable() {
            return Err(ServiceWorkerError::StateError(
                "Can only focus window clients".to_string(),
            ));
        }

        for client in &mut self.clients {
            client.focused = client.id == id;
        }
        debug!(client = %id, "Client focused");
        self.get(id)
            .cloned()
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {}", id)))
    }

    /// Open a window. The new window is focused and keeps `url` verbatim.
    pub fn open_window(&mut self, url: &str) -> Result<Client> {
        self.base
            .join(url)
            .map_err(|e| ServiceWorkerError::InvalidUrl(format!("{}: {}", url, e)))?;

        for client in &mut self.clients {
            client.focused = false;
        }

        let client = Client {
            focused: true,
            ..Client::window(url)
        };
        debug!(client = %client.id, url = %client.url, "Window opened");
        self.clients.push(client.clone());
        Ok(client)
    }

    /// Take control of every client. Returns how many changed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.iter_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.push(client);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
