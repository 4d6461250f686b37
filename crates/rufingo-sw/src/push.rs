//! Push handler: turn a push payload into a displayed notification.
//!
//! Payloads are decoded leniently. A JSON object fills whichever fields it
//! carries; any other UTF-8 text becomes the body; anything else keeps the
//! configured defaults. Decoding never prevents the notification from
//! being shown.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::NotificationDefaults;
use crate::event::PushEvent;
use crate::host::WorkerContext;
use crate::notification::{NotificationData, NotificationDescriptor};

/// Structured push payload. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Push handler.
pub fn on_push(ctx: &WorkerContext, event: &mut PushEvent) {
    let message = parse_payload(event.data());
    let descriptor = build_notification(&ctx.config.notification, message);
    debug!(title = %descriptor.title, url = ?descriptor.data.url, "Push received");

    let sink = Arc::clone(&ctx.notifications);
    event.wait_until(async move { sink.show(descriptor).await.map(|_| ()) });
}

/// Decode a payload without ever failing.
pub fn parse_payload(payload: Option<&[u8]>) -> PushMessage {
    let Some(bytes) = payload else {
        return PushMessage::default();
    };

    let err = match decode_object(bytes) {
        Ok(message) => return message,
        Err(err) => err,
    };

    match std::str::from_utf8(bytes) {
        Ok(text) if !text.trim().is_empty() => {
            warn!(error = %err, "Push payload is not a JSON object, using it as body text");
            PushMessage {
                body: Some(text.to_string()),
                ..PushMessage::default()
            }
        }
        Ok(_) => {
            debug!("Empty push payload, using defaults");
            PushMessage::default()
        }
        Err(utf8_err) => {
            warn!(json_error = %err, utf8_error = %utf8_err, "Undecodable push payload, using defaults");
            PushMessage::default()
        }
    }
}

/// Only a JSON object is a structured message; arrays and scalars are not.
fn decode_object(bytes: &[u8]) -> serde_json::Result<PushMessage> {
    match serde_json::from_slice::<Value>(bytes)? {
        object @ Value::Object(_) => serde_json::from_value(object),
        _ => Err(serde::de::Error::custom("expected a JSON object")),
    }
}

/// Fill the gaps of `message` from `defaults`.
pub fn build_notification(
    defaults: &NotificationDefaults,
    message: PushMessage,
) -> NotificationDescriptor {
    NotificationDescriptor {
        title: message.title.unwrap_or_else(|| defaults.title.clone()),
        body: message.body.unwrap_or_else(|| defaults.body.clone()),
        icon: message.icon.unwrap_or_else(|| defaults.icon.clone()),
        badge: message.badge.unwrap_or_else(|| defaults.badge.clone()),
        vibrate: defaults.vibrate.clone(),
        tag: defaults.tag.clone(),
        require_interaction: defaults.require_interaction,
        data: NotificationData {
            url: Some(message.url.unwrap_or_else(|| defaults.url.clone())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_payload() {
        let message = parse_payload(Some(br#"{"title":"T","body":"B","url":"/x"}"#));
        assert_eq!(message.title.as_deref(), Some("T"));
        assert_eq!(message.body.as_deref(), Some("B"));
        assert_eq!(message.url.as_deref(), Some("/x"));
        assert!(message.icon.is_none());
    }

    #[test]
    fn test_missing_payload_is_default() {
        assert_eq!(parse_payload(None), PushMessage::default());
    }

    #[test]
    fn test_plain_text_becomes_body() {
        let message = parse_payload(Some("Tienes 3 tarjetas".as_bytes()));
        assert_eq!(
            message,
            PushMessage {
                body: Some("Tienes 3 tarjetas".to_string()),
                ..PushMessage::default()
            }
        );
    }

    #[test]
    fn test_broken_json_becomes_body() {
        let message = parse_payload(Some(br#"{"title": "#));
        assert_eq!(message.body.as_deref(), Some(r#"{"title": "#));
        assert!(message.title.is_none());
    }

    #[test]
    fn test_json_with_wrong_types_becomes_body() {
        let message = parse_payload(Some(br#"{"title": 5}"#));
        assert_eq!(message.body.as_deref(), Some(r#"{"title": 5}"#));
    }

    #[test]
    fn test_json_array_becomes_body() {
        let message = parse_payload(Some(br#"["Hola","Repasa"]"#));
        assert_eq!(
            message,
            PushMessage {
                body: Some(r#"["Hola","Repasa"]"#.to_string()),
                ..PushMessage::default()
            }
        );
        assert_eq!(parse_payload(Some(b"[]")).body.as_deref(), Some("[]"));
    }

    #[test]
    fn test_json_scalar_becomes_body() {
        assert_eq!(parse_payload(Some(b"42")).body.as_deref(), Some("42"));
        assert_eq!(parse_payload(Some(b"null")).body.as_deref(), Some("null"));
    }

    #[test]
    fn test_invalid_utf8_keeps_defaults() {
        assert_eq!(parse_payload(Some(&[0xff, 0xfe, 0x00])), PushMessage::default());
    }

    #[test]
    fn test_blank_payload_keeps_defaults() {
        assert_eq!(parse_payload(Some(b"  ")), PushMessage::default());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let message = parse_payload(Some(br#"{"title":"T","extra":[1,2]}"#));
        assert_eq!(message.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_build_uses_defaults_for_gaps() {
        let defaults = NotificationDefaults::default();
        let descriptor = build_notification(
            &defaults,
            PushMessage {
                title: Some("T".to_string()),
                ..PushMessage::default()
            },
        );

        assert_eq!(descriptor.title, "T");
        assert_eq!(descriptor.body, defaults.body);
        assert_eq!(descriptor.icon, "/static/icon-192.png");
        assert_eq!(descriptor.vibrate, vec![200, 100, 200]);
        assert_eq!(descriptor.tag, "rufingo-notification");
        assert_eq!(descriptor.data.url.as_deref(), Some("/"));
    }

    #[test]
    fn test_build_honours_interaction_knob() {
        let defaults = NotificationDefaults {
            require_interaction: true,
            ..NotificationDefaults::default()
        };
        assert!(build_notification(&defaults, PushMessage::default()).require_interaction);
    }

    #[test]
    fn test_message_serializes_without_gaps() {
        let message = PushMessage {
            title: Some("🎓 Rufingo".to_string()),
            url: Some("/repaso/".to_string()),
            ..PushMessage::default()
        };
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"{"title":"🎓 Rufingo","url":"/repaso/"}"#
        );
    }
}
