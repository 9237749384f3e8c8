//! Push messages and notification clicks.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::host::Host;

/// Action that opens the notification's target page.
pub const ACTION_EXPLORE: &str = "explore";
/// Action that just dismisses the notification.
pub const ACTION_CLOSE: &str = "close";

/// JSON body of a push message. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub url: Option<String>,
}

impl PushPayload {
  /// Best-effort decode: an absent or malformed payload yields all defaults.
  pub fn decode(data: Option<&[u8]>) -> Self {
    let Some(data) = data else {
      return Self::default();
    };
    serde_json::from_slice(data).unwrap_or_else(|e| {
      warn!("Ignoring malformed push payload: {}", e);
      Self::default()
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A notification the host is asked to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: Option<String>,
  pub icon: String,
  pub badge: String,
  /// Opaque data carried to the click handler
  pub url: Option<String>,
  pub actions: Vec<NotificationAction>,
}

/// Handle an incoming push message.
pub fn on_push<H: Host + ?Sized>(config: &NotificationConfig, host: &H, data: Option<&[u8]>) -> Notification {
  let payload = PushPayload::decode(data);
  let notification = Notification {
    title: payload
      .title
      .unwrap_or_else(|| config.default_title.clone()),
    body: payload.body,
    icon: config.icon.clone(),
    badge: config.badge.clone(),
    url: payload.url,
    actions: vec![
      NotificationAction {
        action: ACTION_EXPLORE.to_string(),
        title: "Voir".to_string(),
      },
      NotificationAction {
        action: ACTION_CLOSE.to_string(),
        title: "Fermer".to_string(),
      },
    ],
  };

  debug!("Showing notification {:?}", notification.title);
  host.show_notification(&notification);
  notification
}

/// Handle a click on a notification. Only the explore action opens a window;
/// any other click just dismisses it. Returns the opened URL.
pub fn on_notification_click<H: Host + ?Sized>(
  host: &H,
  url: Option<&str>,
  action: Option<&str>,
) -> Option<String> {
  if action != Some(ACTION_EXPLORE) {
    return None;
  }
  let target = url.unwrap_or("/").to_string();
  host.open_window(&target);
  Some(target)
}
