//! Request and response values flowing through the gateway, and the network
//! seam it fetches through.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;
use url::Url;

/// An outbound request as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Value of the `Accept` header, if any
  pub accept: Option<String>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      accept: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = Some(accept.into());
    self
  }

  pub fn accepts(&self, mime: &str) -> bool {
    self.accept.as_deref().is_some_and(|a| a.contains(mime))
  }

  /// A navigation-style request for an HTML document.
  pub fn is_page(&self) -> bool {
    self.method == Method::GET && self.accepts("text/html")
  }

  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Identity of a cached entry: method plus URL, without the fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_string(),
      url: url.into(),
    }
  }

  /// Stable, fixed-length digest used as the storage row key.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: default_reason(status).to_string(),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
    self.status_text = text.into();
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Only exact 200 responses are ever written to a partition.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200
  }
}

fn default_reason(status: u16) -> &'static str {
  reqwest::StatusCode::from_u16(status)
    .ok()
    .and_then(|s| s.canonical_reason())
    .unwrap_or("")
}

/// The network the gateway falls through to.
///
/// An `Err` means the request never produced a response (offline, DNS, reset);
/// HTTP error statuses are `Ok` responses.
pub trait Network: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Network implementation backed by reqwest.
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("hors-ligne/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    if let Some(accept) = &request.accept {
      builder = builder.header(reqwest::header::ACCEPT, accept);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or("").to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_page_requires_get_and_html() {
    let page = Request::get(url("https://a.tg/properties")).with_accept("text/html,*/*");
    assert!(page.is_page());

    let post = Request::new(Method::POST, url("https://a.tg/properties")).with_accept("text/html");
    assert!(!post.is_page());

    assert!(!Request::get(url("https://a.tg/properties")).is_page());
  }

  #[test]
  fn test_key_distinguishes_method() {
    let a = Request::get(url("https://a.tg/x")).key();
    let b = Request::new(Method::HEAD, url("https://a.tg/x")).key();
    assert_ne!(a.digest(), b.digest());
    assert_eq!(a.digest().len(), 64);
    assert_eq!(a.to_string(), "GET https://a.tg/x");
  }

  #[test]
  fn test_key_ignores_fragment() {
    let plain = Request::get(url("https://a.tg/properties")).key();
    let anchored = Request::get(url("https://a.tg/properties#map")).key();
    assert_eq!(plain, anchored);
    assert_eq!(plain.digest(), anchored.digest());
    assert_eq!(anchored.url, "https://a.tg/properties");
  }

  #[test]
  fn test_response_defaults_reason_phrase() {
    assert_eq!(Response::new(404, "").status_text, "Not Found");
    assert_eq!(Response::new(599, "").status_text, "");
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let response = Response::new(200, "x").with_header("Content-Type", "text/plain");
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.header("etag"), None);
  }

  #[test]
  fn test_only_200_is_cacheable() {
    assert!(Response::new(200, "").is_cacheable());
    assert!(!Response::new(201, "").is_cacheable());
    assert!(!Response::new(304, "").is_cacheable());
  }
}
