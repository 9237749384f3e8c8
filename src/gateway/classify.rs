//! Request classification.

use reqwest::Method;

use crate::config::Config;
use crate::http::Request;

/// Caching policy applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Not intercepted: goes to the network unmodified and unobserved
  Bypass,
  Serve(Strategy),
}

/// Decide whether and how the gateway handles a request.
///
/// Exclusions are checked first. After that the first matching rule wins:
/// static asset, then page, then image, then network-first for the rest.
/// A static-looking path that asks for HTML is still a static asset.
pub fn classify(config: &Config, request: &Request) -> Route {
  if is_excluded(config, request) {
    return Route::Bypass;
  }

  let path = request.url.path();
  let strategy = if is_static_asset(path) {
    Strategy::CacheFirst
  } else if request.is_page() {
    Strategy::NetworkFirst
  } else if request.accepts("image") {
    Strategy::StaleWhileRevalidate
  } else {
    Strategy::NetworkFirst
  };

  Route::Serve(strategy)
}

fn is_excluded(config: &Config, request: &Request) -> bool {
  let scheme = request.url.scheme();
  if scheme != "http" && scheme != "https" {
    return true;
  }
  if config.excluded_schemes.iter().any(|s| s == scheme) {
    return true;
  }
  // Partitions only key reads
  if request.method != Method::GET {
    return true;
  }

  let path = request.url.path();
  config
    .excluded_prefixes
    .iter()
    .any(|prefix| path.starts_with(prefix.as_str()))
}

fn is_static_asset(path: &str) -> bool {
  path.contains("/assets/")
    || path.ends_with(".css")
    || path.ends_with(".js")
    || path == "/manifest.json"
}
