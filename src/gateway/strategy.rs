//! The three caching strategies.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{store_response, Gateway, Outcome, Served};
use crate::cache::PartitionStore;
use crate::host::Host;
use crate::http::{Network, Request, RequestKey, Response};

const OFFLINE_CONTENT: &str = "Offline content not available";
const IMAGE_UNAVAILABLE: &str = "Image not available offline";

impl<S: PartitionStore, N: Network, H: Host> Gateway<S, N, H> {
  /// Serve from any partition; only go to the network on a miss.
  pub async fn cache_first(&self, request: &Request) -> Outcome {
    let key = request.key();
    if let Some(snapshot) = self.lookup_any(&key) {
      return Outcome::Hit(snapshot);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        store_response(
          self.store.as_ref(),
          &self.config.static_partition(),
          key,
          &response,
        );
        Outcome::Fetched(response)
      }
      Err(e) => {
        debug!("Cache-first fetch failed: {}", e);
        Outcome::Synthetic(
          Response::new(503, OFFLINE_CONTENT).with_header("content-type", "text/plain"),
        )
      }
    }
  }

  /// Prefer the network; fall back to the cached copy, then to the cached
  /// app shell for pages, then to a bare 503.
  pub async fn network_first(&self, request: &Request) -> Outcome {
    let key = request.key();
    let error = match self.network.fetch(request).await {
      Ok(response) => {
        store_response(
          self.store.as_ref(),
          &self.config.dynamic_partition(),
          key,
          &response,
        );
        return Outcome::Fetched(response);
      }
      Err(e) => e,
    };
    debug!("Network-first fetch failed, trying cache: {}", error);

    if let Some(snapshot) = self.lookup_any(&key) {
      return Outcome::Hit(snapshot);
    }

    if request.is_page() {
      match request.url.join("/") {
        Ok(root) => {
          if let Some(shell) = self.lookup_any(&RequestKey::new(&request.method, &root)) {
            return Outcome::Hit(shell);
          }
        }
        Err(e) => warn!("Cannot derive shell URL from {}: {}", request.url, e),
      }
    }

    Outcome::Synthetic(Response::new(503, Vec::new()).with_status_text("Service Unavailable"))
  }

  /// Answer from the dynamic partition right away when possible, refreshing
  /// it in the background. Only waits on the network when nothing is cached.
  ///
  /// The refresh write and any other write to the same key are unordered;
  /// the last one wins.
  pub async fn stale_while_revalidate(&self, request: &Request) -> Served {
    let partition = self.config.dynamic_partition();
    let cached = self
      .store
      .lookup(&partition, &request.key())
      .unwrap_or_else(|e| {
        warn!("Cache lookup for {} failed: {}", request.url, e);
        None
      });

    let refresh = tokio::spawn(revalidate(
      Arc::clone(&self.store),
      Arc::clone(&self.network),
      partition,
      request.clone(),
    ));

    if let Some(snapshot) = cached {
      return Served {
        outcome: Outcome::Hit(snapshot),
        refresh: Some(refresh),
      };
    }

    let outcome = match refresh.await {
      Ok(Some(response)) => Outcome::Fetched(response),
      Ok(None) => Outcome::Synthetic(image_unavailable()),
      Err(e) => {
        warn!("Revalidation task for {} failed: {}", request.url, e);
        Outcome::Synthetic(image_unavailable())
      }
    };

    Served::from(outcome)
  }
}

fn image_unavailable() -> Response {
  Response::new(200, IMAGE_UNAVAILABLE).with_header("content-type", "text/plain")
}

/// Fetch and, on a 200, overwrite the cached copy. `None` on network failure.
async fn revalidate<S: PartitionStore, N: Network>(
  store: Arc<S>,
  network: Arc<N>,
  partition: String,
  request: Request,
) -> Option<Response> {
  match network.fetch(&request).await {
    Ok(response) => {
      store_response(store.as_ref(), &partition, request.key(), &response);
      Some(response)
    }
    Err(e) => {
      debug!("Revalidation of {} failed: {}", request.url, e);
      None
    }
  }
}
