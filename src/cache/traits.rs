//! Core types for the partition store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::{RequestKey, Response};

/// Immutable capture of a network response at the time it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  /// Request the response answered
  pub key: RequestKey,
  /// Status, headers and body as received
  pub response: Response,
  /// When the snapshot was written
  pub cached_at: DateTime<Utc>,
}

impl Snapshot {
  /// Capture a response now.
  pub fn capture(key: RequestKey, response: Response) -> Self {
    Self {
      key,
      response,
      cached_at: Utc::now(),
    }
  }
}
