//! In-memory partition store.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::storage::PartitionStore;
use super::traits::Snapshot;
use crate::http::RequestKey;

type Partitions = Vec<(String, HashMap<RequestKey, Snapshot>)>;

/// Partition store that lives only as long as the process.
///
/// Partitions are kept in creation order so cross-partition lookups behave
/// like the persistent store.
#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<Partitions>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Partitions>> {
    self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn find_or_create<'a>(
  partitions: &'a mut Partitions,
  name: &str,
) -> &'a mut HashMap<RequestKey, Snapshot> {
  let index = match partitions.iter().position(|(n, _)| n == name) {
    Some(index) => index,
    None => {
      partitions.push((name.to_string(), HashMap::new()));
      partitions.len() - 1
    }
  };
  &mut partitions[index].1
}

impl PartitionStore for MemoryStore {
  fn open(&self, partition: &str) -> Result<()> {
    let mut partitions = self.lock()?;
    find_or_create(&mut partitions, partition);
    Ok(())
  }

  fn partitions(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.iter().map(|(n, _)| n.clone()).collect())
  }

  fn put(&self, partition: &str, snapshot: &Snapshot) -> Result<()> {
    let mut partitions = self.lock()?;
    find_or_create(&mut partitions, partition).insert(snapshot.key.clone(), snapshot.clone());
    Ok(())
  }

  fn lookup(&self, partition: &str, key: &RequestKey) -> Result<Option<Snapshot>> {
    let partitions = self.lock()?;
    Ok(
      partitions
        .iter()
        .find(|(n, _)| n == partition)
        .and_then(|(_, entries)| entries.get(key).cloned()),
    )
  }

  fn lookup_any(&self, key: &RequestKey) -> Result<Option<Snapshot>> {
    let partitions = self.lock()?;
    Ok(
      partitions
        .iter()
        .find_map(|(_, entries)| entries.get(key).cloned()),
    )
  }

  fn retain_only(&self, keep: &[String]) -> Result<Vec<String>> {
    let mut partitions = self.lock()?;
    let mut deleted = Vec::new();
    partitions.retain(|(name, _)| {
      let live = keep.contains(name);
      if !live {
        deleted.push(name.clone());
      }
      live
    });
    Ok(deleted)
  }

  fn entry_count(&self, partition: &str) -> Result<usize> {
    let partitions = self.lock()?;
    Ok(
      partitions
        .iter()
        .find(|(n, _)| n == partition)
        .map(|(_, entries)| entries.len())
        .unwrap_or(0),
    )
  }
}
