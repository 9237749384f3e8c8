//! Side effects the gateway asks of the environment hosting it.

use tracing::info;

use crate::notify::Notification;

/// Hosting environment of the gateway.
///
/// Lifecycle transitions and notification handlers only ever talk to the
/// outside world through this trait.
pub trait Host: Send + Sync + 'static {
  /// Take over from a previous gateway instance without waiting for its
  /// clients to go away.
  fn skip_waiting(&self);

  /// Start controlling every open client immediately.
  fn claim_clients(&self);

  /// Display a system notification.
  fn show_notification(&self, notification: &Notification);

  /// Open a client window at `url`.
  fn open_window(&self, url: &str);
}

/// Host for the command line: side effects are reported on stdout.
pub struct ConsoleHost;

impl Host for ConsoleHost {
  fn skip_waiting(&self) {
    info!("Skipping handover delay");
  }

  fn claim_clients(&self) {
    info!("Claiming open clients");
  }

  fn show_notification(&self, notification: &Notification) {
    println!("[notification] {}", notification.title);
    if let Some(body) = &notification.body {
      println!("  {}", body);
    }
    if let Some(url) = &notification.url {
      println!("  -> {}", url);
    }
    let actions: Vec<String> = notification
      .actions
      .iter()
      .map(|a| format!("{}={}", a.action, a.title))
      .collect();
    println!("  icon {} badge {} [{}]", notification.icon, notification.badge, actions.join(", "));
  }

  fn open_window(&self, url: &str) {
    println!("[open] {}", url);
  }
}
