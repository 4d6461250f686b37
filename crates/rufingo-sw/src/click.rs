//! Notification click handler.

use tracing::{debug, info};

use crate::clients::{Client, ClientMatchOptions, ClientType};
use crate::config::ClickBehavior;
use crate::event::NotificationClickEvent;
use crate::host::WorkerContext;
use crate::notification::Notification;
use crate::Result;

/// What a click ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing window was focused.
    Focused(Client),
    /// A new window was opened.
    Opened(Client),
}

/// Notification click handler.
pub fn on_notification_click(ctx: &WorkerContext, event: &mut NotificationClickEvent) {
    let ctx = ctx.clone();
    let notification = event.notification.clone();
    event.wait_until(async move { route_click(&ctx, &notification).await.map(|_| ()) });
}

/// Close the notification, then focus or open a window at its target URL.
///
/// With [`ClickBehavior::FocusExisting`] the first window client, in
/// enumeration order and including uncontrolled ones, whose URL equals the
/// target string exactly is focused.
pub async fn route_click(ctx: &WorkerContext, notification: &Notification) -> Result<ClickOutcome> {
    ctx.notifications.close(notification.id).await;

    let target = notification.target_url();
    let mut clients = ctx.clients.write().await;

    if ctx.config.click_behavior == ClickBehavior::FocusExisting {
        let windows = clients.match_all(&ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        });
        if let Some(existing) = windows
            .into_iter()
            .find(|c| c.url == target && c.is_focusable())
        {
            let focused = clients.focus(&existing.id)?;
            info!(client = %focused.id, url = %target, "Focused existing window");
            return Ok(ClickOutcome::Focused(focused));
        }
        debug!(url = %target, "No window shows the target");
    }

    let opened = clients.open_window(target)?;
    info!(client = %opened.id, url = %target, "Opened window");
    Ok(ClickOutcome::Opened(opened))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::notification::{
        NotificationData, NotificationDescriptor, NotificationSink, NotificationTray,
    };
    use crate::push::{build_notification, PushMessage};
    use async_trait::async_trait;
    use rufingo_net::{Fetch, NetError, Request, Response};
    use std::sync::Arc;

    struct NoNetwork;

    #[async_trait]
    impl Fetch for NoNetwork {
        async fn fetch(&self, _request: Request) -> std::result::Result<Response, NetError> {
            Err(NetError::RequestFailed("offline".to_string()))
        }
    }

    fn context(behavior: ClickBehavior, tray: Arc<NotificationTray>) -> WorkerContext {
        let config = WorkerConfig {
            click_behavior: behavior,
            ..WorkerConfig::default()
        };
        WorkerContext::new(config, Arc::new(NoNetwork), tray)
    }

    async fn show(tray: &NotificationTray, url: Option<&str>) -> Notification {
        let mut descriptor: NotificationDescriptor =
            build_notification(&Default::default(), PushMessage::default());
        descriptor.data = NotificationData {
            url: url.map(str::to_string),
        };
        tray.show(descriptor).await.unwrap()
    }

    #[tokio::test]
    async fn test_focuses_exact_match() {
        let tray = Arc::new(NotificationTray::new());
        let ctx = context(ClickBehavior::FocusExisting, Arc::clone(&tray));
        let existing = Client::window("/x");
        ctx.clients.write().await.add(existing.clone());

        let notification = show(&tray, Some("/x")).await;
        let outcome = route_click(&ctx, &notification).await.unwrap();

        match outcome {
            ClickOutcome::Focused(client) => assert_eq!(client.id, existing.id),
            other => panic!("expected focus, got {:?}", other),
        }
        assert_eq!(ctx.clients.read().await.len(), 1);
        assert!(tray.displayed().await.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_is_not_a_match() {
        let tray = Arc::new(NotificationTray::new());
        let ctx = context(ClickBehavior::FocusExisting, Arc::clone(&tray));
        ctx.clients.write().await.add(Client::window("/x/"));
        ctx.clients
            .write()
            .await
            .add(Client::window("http://localhost:8000/x"));

        let notification = show(&tray, Some("/x")).await;
        let outcome = route_click(&ctx, &notification).await.unwrap();

        assert!(matches!(outcome, ClickOutcome::Opened(ref c) if c.url == "/x"));
        assert_eq!(ctx.clients.read().await.len(), 3);
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let tray = Arc::new(NotificationTray::new());
        let ctx = context(ClickBehavior::FocusExisting, Arc::clone(&tray));
        let first = Client::window("/repaso/");
        let second = Client::window("/repaso/");
        ctx.clients.write().await.add(first.clone());
        ctx.clients.write().await.add(second.clone());

        let notification = show(&tray, Some("/repaso/")).await;
        let outcome = route_click(&ctx, &notification).await.unwrap();

        assert!(matches!(outcome, ClickOutcome::Focused(ref c) if c.id == first.id));
        assert!(!ctx.clients.read().await.get(&second.id).unwrap().focused);
    }

    #[tokio::test]
    async fn test_open_window_behavior_ignores_existing() {
        let tray = Arc::new(NotificationTray::new());
        let ctx = context(ClickBehavior::OpenWindow, Arc::clone(&tray));
        ctx.clients.write().await.add(Client::window("/"));

        let notification = show(&tray, None).await;
        let outcome = route_click(&ctx, &notification).await.unwrap();

        assert!(matches!(outcome, ClickOutcome::Opened(ref c) if c.url == "/"));
        assert_eq!(ctx.clients.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_handler_closes_even_when_open_fails() {
        let tray = Arc::new(NotificationTray::new());
        let ctx = context(ClickBehavior::OpenWindow, Arc::clone(&tray));

        let notification = show(&tray, Some("http://[::1")).await;
        let mut event = NotificationClickEvent::new(notification);
        on_notification_click(&ctx, &mut event);

        assert!(event.settle().await.is_err());
        assert!(tray.displayed().await.is_empty());
    }
}
