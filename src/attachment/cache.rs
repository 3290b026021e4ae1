use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{sweep_period, Sweeper, TtlCache};

use super::AttachmentFormat;

/// A downloaded attachment ready to be served inline.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentCacheEntry {
  pub content: Arc<[u8]>,
  pub content_type: String,
  pub size: u64,
  pub width: Option<u32>,
  pub height: Option<u32>,
  pub resized: bool,
}

/// Inline attachment bodies keyed by URL and output format.
#[derive(Debug)]
pub struct AttachmentCache {
  entries: TtlCache<AttachmentCacheEntry>,
  sweeper: Sweeper,
}

impl AttachmentCache {
  pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

  pub fn new(ttl: Duration) -> Self {
    let entries = TtlCache::new(ttl);
    let sweeper = {
      let entries = entries.clone();
      Sweeper::spawn("attachment", sweep_period(ttl), move || {
        entries.remove_expired()
      })
    };
    Self { entries, sweeper }
  }

  /// Hex SHA-256 of `url:format`.
  pub fn key(url: &str, format: AttachmentFormat) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b":");
    hasher.update(format.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn get(&self, url: &str, format: AttachmentFormat) -> Option<AttachmentCacheEntry> {
    self.entries.get(&Self::key(url, format))
  }

  pub fn set(&self, url: &str, format: AttachmentFormat, entry: AttachmentCacheEntry) {
    self.entries.set(Self::key(url, format), entry);
  }

  pub fn remove(&self, url: &str, format: AttachmentFormat) -> Option<AttachmentCacheEntry> {
    self.entries.remove(&Self::key(url, format))
  }

  pub fn remove_expired(&self) -> usize {
    self.entries.remove_expired()
  }

  pub fn clear(&self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn stop(&self) {
    self.sweeper.stop();
  }
}

impl Default for AttachmentCache {
  fn default() -> Self {
    Self::new(Self::DEFAULT_TTL)
  }
}
