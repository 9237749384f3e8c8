//! Install and activate transitions.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use tracing::{info, warn};

use super::Gateway;
use crate::cache::{PartitionStore, Snapshot};
use crate::host::Host;
use crate::http::{Network, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub partition: String,
  /// Shell assets written to the static partition
  pub stored: Vec<String>,
  /// Shell assets that could not be fetched or were not a 200
  pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  pub kept: Vec<String>,
  pub deleted: Vec<String>,
}

impl<S: PartitionStore, N: Network, H: Host> Gateway<S, N, H> {
  pub fn state(&self) -> LifecycleState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(LifecycleState::Parsed)
  }

  fn set_state(&self, next: LifecycleState) -> Result<LifecycleState> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(std::mem::replace(&mut *state, next))
  }

  /// Open the static partition and fill it with the shell assets.
  ///
  /// Population is best-effort: each asset is fetched on its own and a
  /// failure is only logged. Install always completes, even when the store
  /// is unusable; the assets it could not write are reported as failed.
  pub async fn install(&self) -> Result<InstallReport> {
    self.set_state(LifecycleState::Installing)?;
    let partition = self.config.static_partition();

    if let Err(e) = self.store.open(&partition) {
      warn!("Failed to open partition {}: {}", partition, e);
    }

    let results = join_all(
      self
        .config
        .shell_assets
        .iter()
        .map(|asset| self.precache(&partition, asset)),
    )
    .await;

    let mut report = InstallReport {
      partition,
      ..InstallReport::default()
    };
    for (asset, result) in self.config.shell_assets.iter().zip(results) {
      match result {
        Ok(()) => report.stored.push(asset.clone()),
        Err(e) => {
          warn!("Skipping shell asset {}: {}", asset, e);
          report.failed.push(asset.clone());
        }
      }
    }

    info!(
      "Installed {}: {} stored, {} failed",
      report.partition,
      report.stored.len(),
      report.failed.len()
    );
    self.set_state(LifecycleState::Installed)?;
    self.host.skip_waiting();
    Ok(report)
  }

  async fn precache(&self, partition: &str, asset: &str) -> Result<()> {
    let url = self.config.resolve(asset)?;
    let request = Request::get(url);
    let response = self.network.fetch(&request).await?;
    if !response.is_cacheable() {
      return Err(eyre!("status {}", response.status));
    }
    self
      .store
      .put(partition, &Snapshot::capture(request.key(), response))
  }

  /// Delete every partition other than the current static and dynamic ones,
  /// then take control of open clients.
  pub async fn activate(&self) -> Result<ActivateReport> {
    let previous = self.set_state(LifecycleState::Activating)?;
    let kept = vec![
      self.config.static_partition(),
      self.config.dynamic_partition(),
    ];

    let deleted = match self.store.retain_only(&kept) {
      Ok(deleted) => deleted,
      Err(e) => {
        self.set_state(previous)?;
        return Err(eyre!("Failed to sweep old partitions: {}", e));
      }
    };
    for name in &deleted {
      info!("Deleted orphaned partition {}", name);
    }

    self.set_state(LifecycleState::Activated)?;
    self.host.claim_clients();
    Ok(ActivateReport { kept, deleted })
  }

  /// Whether a request would currently be answered without the network.
  pub fn is_cached(&self, request: &Request) -> bool {
    self.lookup_any(&request.key()).is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::{gateway, gateway_with, request, ScriptedNetwork};
  use super::*;
  use crate::config::Config;
  use crate::host::testing::RecordingHost;
  use crate::http::{RequestKey, Response};

  fn small_config() -> Config {
    Config {
      shell_assets: vec![
        "/".to_string(),
        "/manifest.json".to_string(),
        "/icons/icon-192x192.png".to_string(),
      ],
      ..Config::default()
    }
  }

  #[tokio::test]
  async fn test_install_populates_static_partition() {
    let gw = gateway_with(small_config());
    gw.network().respond("https://togo-immo.tg/", Response::new(200, "shell"));
    gw.network()
      .respond("https://togo-immo.tg/manifest.json", Response::new(200, "{}"));
    gw.network()
      .respond("https://togo-immo.tg/icons/icon-192x192.png", Response::new(200, "png"));

    let report = gw.install().await.unwrap();

    assert_eq!(report.stored.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(gw.store().entry_count(&gw.config().static_partition()).unwrap(), 3);
    assert!(gw.is_cached(&request("/")));
    assert_eq!(gw.state(), LifecycleState::Installed);
    assert_eq!(gw.host().calls(), vec!["skip_waiting".to_string()]);
  }

  #[tokio::test]
  async fn test_install_survives_unreachable_assets() {
    let gw = gateway_with(small_config());
    gw.network().respond("https://togo-immo.tg/", Response::new(200, "shell"));
    gw.network()
      .respond("https://togo-immo.tg/manifest.json", Response::new(404, ""));

    let report = gw.install().await.unwrap();

    assert_eq!(report.stored, vec!["/".to_string()]);
    assert_eq!(
      report.failed,
      vec!["/manifest.json".to_string(), "/icons/icon-192x192.png".to_string()]
    );
    assert_eq!(gw.store().entry_count(&report.partition).unwrap(), 1);
    assert_eq!(gw.state(), LifecycleState::Installed);
  }

  #[tokio::test]
  async fn test_install_fully_offline_still_creates_partition() {
    let gw = gateway_with(small_config());

    let report = gw.install().await.unwrap();

    assert!(report.stored.is_empty());
    assert_eq!(
      gw.store().partitions().unwrap(),
      vec![gw.config().static_partition()]
    );
  }

  /// Store that refuses every operation.
  struct BrokenStore;

  impl PartitionStore for BrokenStore {
    fn open(&self, partition: &str) -> Result<()> {
      Err(eyre!("disk full: {}", partition))
    }
    fn partitions(&self) -> Result<Vec<String>> {
      Err(eyre!("disk full"))
    }
    fn put(&self, partition: &str, _snapshot: &Snapshot) -> Result<()> {
      Err(eyre!("disk full: {}", partition))
    }
    fn lookup(&self, _partition: &str, _key: &RequestKey) -> Result<Option<Snapshot>> {
      Err(eyre!("disk full"))
    }
    fn lookup_any(&self, _key: &RequestKey) -> Result<Option<Snapshot>> {
      Err(eyre!("disk full"))
    }
    fn retain_only(&self, _keep: &[String]) -> Result<Vec<String>> {
      Err(eyre!("disk full"))
    }
    fn entry_count(&self, _partition: &str) -> Result<usize> {
      Err(eyre!("disk full"))
    }
  }

  #[tokio::test]
  async fn test_install_completes_when_store_is_unusable() {
    let gw = Gateway::new(
      small_config(),
      BrokenStore,
      ScriptedNetwork::default(),
      RecordingHost::default(),
    );
    gw.network().respond("https://togo-immo.tg/", Response::new(200, "shell"));
    gw.network()
      .respond("https://togo-immo.tg/manifest.json", Response::new(200, "{}"));

    let report = gw.install().await.unwrap();

    assert!(report.stored.is_empty());
    assert_eq!(report.failed, small_config().shell_assets);
    assert_eq!(gw.state(), LifecycleState::Installed);
    assert_eq!(gw.host().calls(), vec!["skip_waiting".to_string()]);
  }

  #[tokio::test]
  async fn test_install_twice_overwrites() {
    let gw = gateway_with(small_config());
    gw.network().respond("https://togo-immo.tg/", Response::new(200, "v1"));
    gw.install().await.unwrap();
    gw.network().respond("https://togo-immo.tg/", Response::new(200, "v2"));
    gw.install().await.unwrap();

    let stored = gw
      .store()
      .lookup(&gw.config().static_partition(), &request("/").key())
      .unwrap()
      .unwrap();
    assert_eq!(stored.response.body, b"v2");
    assert_eq!(gw.store().entry_count(&gw.config().static_partition()).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_activate_leaves_only_current_partitions() {
    let gw = gateway();
    for name in ["togo-immo-static-v2", "togo-immo-dynamic-v2", "other-app"] {
      gw.store().open(name).unwrap();
    }
    gw.store().open(&gw.config().static_partition()).unwrap();
    gw.store().open(&gw.config().dynamic_partition()).unwrap();

    let report = gw.activate().await.unwrap();

    assert_eq!(
      report.deleted,
      vec![
        "togo-immo-static-v2".to_string(),
        "togo-immo-dynamic-v2".to_string(),
        "other-app".to_string(),
      ]
    );
    let mut live = gw.store().partitions().unwrap();
    live.sort();
    assert_eq!(
      live,
      vec![gw.config().dynamic_partition(), gw.config().static_partition()]
    );
    assert_eq!(gw.state(), LifecycleState::Activated);
    assert_eq!(gw.host().calls(), vec!["claim_clients".to_string()]);
  }

  #[tokio::test]
  async fn test_activate_is_idempotent() {
    let gw = gateway();
    gw.store().open("togo-immo-static-v1").unwrap();

    let first = gw.activate().await.unwrap();
    let second = gw.activate().await.unwrap();

    assert_eq!(first.deleted, vec!["togo-immo-static-v1".to_string()]);
    assert!(second.deleted.is_empty());
  }

  #[tokio::test]
  async fn test_version_bump_sweeps_previous_install() {
    let old = gateway_with(Config {
      version: "v2".to_string(),
      ..small_config()
    });
    old.network().respond("https://togo-immo.tg/", Response::new(200, "old shell"));
    old.install().await.unwrap();

    // Same store, new version
    let store = crate::cache::MemoryStore::new();
    for name in old.store().partitions().unwrap() {
      store.open(&name).unwrap();
    }
    let new = Gateway::new(
      small_config(),
      store,
      ScriptedNetwork::default(),
      RecordingHost::default(),
    );
    new.install().await.unwrap();
    let report = new.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["togo-immo-static-v2".to_string()]);
  }
}
