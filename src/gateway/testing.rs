//! Test doubles for driving the gateway without a network.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::Gateway;
use crate::cache::MemoryStore;
use crate::config::Config;
use crate::host::testing::RecordingHost;
use crate::http::{Network, Request, Response};

#[derive(Debug, Clone)]
pub enum Reply {
  Respond(Response),
  Fail,
  /// Never settles
  Pending,
}

/// Network whose answers are scripted per URL. Unscripted URLs fail.
#[derive(Default)]
pub struct ScriptedNetwork {
  replies: Mutex<HashMap<String, Reply>>,
  calls: AtomicUsize,
}

impl ScriptedNetwork {
  pub fn respond(&self, url: &str, response: Response) {
    self.script(url, Reply::Respond(response));
  }

  pub fn script(&self, url: &str, reply: Reply) {
    self.replies.lock().unwrap().insert(url.to_string(), reply);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Network for ScriptedNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let reply = self
      .replies
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .unwrap_or(Reply::Fail);

    match reply {
      Reply::Respond(response) => Ok(response),
      Reply::Fail => Err(eyre!("offline: {}", request.url)),
      Reply::Pending => std::future::pending().await,
    }
  }
}

pub type TestGateway = Gateway<MemoryStore, ScriptedNetwork, RecordingHost>;

pub fn gateway() -> TestGateway {
  gateway_with(Config::default())
}

pub fn gateway_with(config: Config) -> TestGateway {
  Gateway::new(
    config,
    MemoryStore::new(),
    ScriptedNetwork::default(),
    RecordingHost::default(),
  )
}

/// Plain GET against the default origin.
pub fn request(path: &str) -> Request {
  Request::get(Config::default().resolve(path).unwrap())
}

/// Browser navigation to a page on the default origin.
pub fn page(path: &str) -> Request {
  request(path).with_accept("text/html,application/xhtml+xml,*/*;q=0.8")
}
