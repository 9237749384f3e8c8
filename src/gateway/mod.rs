//! Offline cache gateway.
//!
//! Every outbound request is either passed through untouched or served by one
//! of three strategies over the static and dynamic partitions:
//! - Cache-first for shell assets (scripts, styles, manifest)
//! - Network-first for pages and everything unclassified
//! - Stale-while-revalidate for images
//!
//! Network failures never surface to the caller: each strategy turns them
//! into a cached or synthetic response.

mod classify;
mod lifecycle;
mod strategy;
#[cfg(test)]
pub mod testing;

pub use classify::{classify, Route, Strategy};
pub use lifecycle::LifecycleState;

use color_eyre::Result;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{PartitionStore, Snapshot};
use crate::config::Config;
use crate::host::Host;
use crate::http::{Network, Request, RequestKey, Response};
use crate::notify::{self, Notification};

/// What a strategy answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// Served from a partition
  Hit(Snapshot),
  /// Straight from the network (stored or not)
  Fetched(Response),
  /// Generated by the gateway because nothing better was available
  Synthetic(Response),
}

impl Outcome {
  pub fn response(&self) -> &Response {
    match self {
      Outcome::Hit(snapshot) => &snapshot.response,
      Outcome::Fetched(response) | Outcome::Synthetic(response) => response,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Outcome::Hit(_) => "hit",
      Outcome::Fetched(_) => "fetched",
      Outcome::Synthetic(_) => "synthetic",
    }
  }
}

/// An outcome together with the background refresh it left running, if any.
#[derive(Debug)]
pub struct Served {
  pub outcome: Outcome,
  /// Set when stale-while-revalidate answered from cache. Dropping it
  /// detaches the task, which is cancelled if the runtime shuts down first.
  pub refresh: Option<JoinHandle<Option<Response>>>,
}

impl Served {
  /// Wait for the background refresh to finish its cache write.
  /// Returns the refreshed response, if the network produced one.
  pub async fn settle(&mut self) -> Option<Response> {
    let refresh = self.refresh.take()?;
    refresh.await.unwrap_or_else(|e| {
      warn!("Background refresh failed: {}", e);
      None
    })
  }
}

impl From<Outcome> for Served {
  fn from(outcome: Outcome) -> Self {
    Self {
      outcome,
      refresh: None,
    }
  }
}

/// The gateway: configuration plus the store, network and host it drives.
pub struct Gateway<S: PartitionStore, N: Network, H: Host> {
  config: Arc<Config>,
  store: Arc<S>,
  network: Arc<N>,
  host: Arc<H>,
  state: Arc<Mutex<LifecycleState>>,
}

impl<S: PartitionStore, N: Network, H: Host> Gateway<S, N, H> {
  pub fn new(config: Config, store: S, network: N, host: H) -> Self {
    Self {
      config: Arc::new(config),
      store: Arc::new(store),
      network: Arc::new(network),
      host: Arc::new(host),
      state: Arc::new(Mutex::new(LifecycleState::Parsed)),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  #[cfg(test)]
  pub fn network(&self) -> &N {
    &self.network
  }

  #[cfg(test)]
  pub fn host(&self) -> &H {
    &self.host
  }

  /// Intercept a request. `None` means the gateway stays out of the way and
  /// the caller should go to the network itself.
  ///
  /// Any background refresh is detached; use [`Gateway::dispatch`] when the
  /// caller must outlive it.
  #[cfg(test)]
  pub async fn handle(&self, request: &Request) -> Option<Outcome> {
    self.dispatch(request).await.map(|served| served.outcome)
  }

  /// Like [`Gateway::handle`], but hands back the background refresh too.
  pub async fn dispatch(&self, request: &Request) -> Option<Served> {
    match classify(&self.config, request) {
      Route::Bypass => {
        debug!("Bypassing {} {}", request.method, request.url);
        None
      }
      Route::Serve(strategy) => {
        let served = self.serve(strategy, request).await;
        debug!(
          "{} {} via {:?}: {} {}",
          request.method,
          request.url,
          strategy,
          served.outcome.kind(),
          served.outcome.response().status
        );
        Some(served)
      }
    }
  }

  /// Send a request the gateway does not intercept straight to the network.
  /// Unlike the strategies, failures are returned to the caller.
  pub async fn passthrough(&self, request: &Request) -> Result<Response> {
    self.network.fetch(request).await
  }

  /// Run a specific strategy, skipping classification.
  pub async fn serve(&self, strategy: Strategy, request: &Request) -> Served {
    match strategy {
      Strategy::CacheFirst => self.cache_first(request).await.into(),
      Strategy::NetworkFirst => self.network_first(request).await.into(),
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
    }
  }

  /// Handle a push message.
  pub fn on_push(&self, data: Option<&[u8]>) -> Notification {
    notify::on_push(&self.config.notifications, self.host.as_ref(), data)
  }

  /// Handle a notification click.
  pub fn on_notification_click(&self, url: Option<&str>, action: Option<&str>) -> Option<String> {
    notify::on_notification_click(self.host.as_ref(), url, action)
  }

  /// Cross-partition lookup; store errors count as a miss.
  fn lookup_any(&self, key: &RequestKey) -> Option<Snapshot> {
    self.store.lookup_any(key).unwrap_or_else(|e| {
      warn!("Cache lookup for {} failed: {}", key, e);
      None
    })
  }
}

/// Write a 200 response into a partition. Anything else is ignored, and a
/// failed write is logged rather than returned.
fn store_response<S: PartitionStore>(store: &S, partition: &str, key: RequestKey, response: &Response) {
  if !response.is_cacheable() {
    debug!("Not caching {} (status {})", key, response.status);
    return;
  }
  let snapshot = Snapshot::capture(key, response.clone());
  if let Err(e) = store.put(partition, &snapshot) {
    warn!("Failed to cache {} in {}: {}", snapshot.key, partition, e);
  }
}
