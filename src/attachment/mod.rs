//! Attachment retrieval for callers that want bytes inline.
//!
//! `AttachmentClient::get_attachment` answers `metadata` and `url` requests
//! without touching the network. For `base64` it downloads through
//! [`Downloader`], shrinks oversized images with an [`ImageProcessor`] and
//! caches the result. Anything that cannot be served inline degrades to the
//! bare URL with an explanation instead of failing outright.

mod cache;
mod download;
mod error;
mod image;
mod retry;

pub use cache::{AttachmentCache, AttachmentCacheEntry};
pub use download::{is_private_upload_url, sniff_content_type, Downloaded, Downloader};
pub use error::DownloadError;
pub use self::image::{DefaultImageProcessor, ImageProcessor, OutputFormat, ResizeError, ResizedImage};
pub use retry::{retry_async, RetryConfig, RetryStats};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::ValueEnum;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AttachmentsConfig, CacheConfig};
use crate::linear::TokenProvider;

/// Largest body returned inline. Bigger content is resized or served as a URL.
pub const DEFAULT_MAX_INLINE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentFormat {
  Metadata,
  Url,
  #[default]
  Base64,
}

impl AttachmentFormat {
  pub fn as_str(self) -> &'static str {
    match self {
      AttachmentFormat::Metadata => "metadata",
      AttachmentFormat::Url => "url",
      AttachmentFormat::Base64 => "base64",
    }
  }
}

impl fmt::Display for AttachmentFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentResponse {
  pub format: AttachmentFormat,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub content: String,
  pub url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub size: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub width: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub height: Option<u32>,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub resized: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl AttachmentResponse {
  fn bare(url: &str, format: AttachmentFormat) -> Self {
    Self {
      format,
      content: String::new(),
      url: url.to_string(),
      content_type: None,
      size: None,
      width: None,
      height: None,
      resized: false,
      error: None,
    }
  }
}

/// Why content was not served inline.
#[derive(Debug)]
pub enum DegradeReason {
  TooLarge { size: u64, limit: u64 },
  ResizeFailed { size: u64, limit: u64, error: ResizeError },
}

impl fmt::Display for DegradeReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DegradeReason::TooLarge { size, limit } => write!(
        f,
        "attachment is {} bytes, over the {} byte inline limit; returning the URL instead",
        size, limit
      ),
      DegradeReason::ResizeFailed { size, limit, error } => write!(
        f,
        "image is {} bytes, over the {} byte inline limit, and resizing failed ({}); \
         returning the URL instead",
        size, limit, error
      ),
    }
  }
}

/// Result of the `base64` pipeline before it is flattened into a response.
#[derive(Debug)]
pub enum AttachmentOutcome {
  Inline {
    entry: AttachmentCacheEntry,
    from_cache: bool,
  },
  Degraded {
    url: String,
    content_type: String,
    size: u64,
    reason: DegradeReason,
  },
  Failed(DownloadError),
}

impl AttachmentOutcome {
  pub fn into_response(self, url: &str) -> AttachmentResponse {
    match self {
      AttachmentOutcome::Inline { entry, .. } => AttachmentResponse {
        content: STANDARD.encode(&entry.content),
        content_type: Some(entry.content_type),
        size: Some(entry.size),
        width: entry.width,
        height: entry.height,
        resized: entry.resized,
        ..AttachmentResponse::bare(url, AttachmentFormat::Base64)
      },
      AttachmentOutcome::Degraded {
        url: original,
        content_type,
        size,
        reason,
      } => AttachmentResponse {
        content: original,
        content_type: Some(content_type),
        size: Some(size),
        error: Some(reason.to_string()),
        ..AttachmentResponse::bare(url, AttachmentFormat::Url)
      },
      AttachmentOutcome::Failed(e) => AttachmentResponse {
        error: Some(format!("failed to download attachment: {}", e)),
        ..AttachmentResponse::bare(url, AttachmentFormat::Base64)
      },
    }
  }
}

pub struct AttachmentClient {
  downloader: Downloader,
  cache: Arc<AttachmentCache>,
  images: Arc<dyn ImageProcessor>,
  max_inline_bytes: u64,
}

impl AttachmentClient {
  pub fn new(downloader: Downloader, cache: Arc<AttachmentCache>) -> Self {
    Self {
      downloader,
      cache,
      images: Arc::new(DefaultImageProcessor),
      max_inline_bytes: DEFAULT_MAX_INLINE_BYTES,
    }
  }

  pub fn from_config(
    attachments: &AttachmentsConfig,
    cache: &CacheConfig,
    tokens: Arc<dyn TokenProvider>,
  ) -> Self {
    let downloader = Downloader::from_config(attachments, tokens);
    let cache = Arc::new(AttachmentCache::new(cache.attachment_ttl()));
    Self::new(downloader, cache).with_max_inline_bytes(attachments.max_inline_bytes)
  }

  pub fn with_image_processor(mut self, images: Arc<dyn ImageProcessor>) -> Self {
    self.images = images;
    self
  }

  pub fn with_max_inline_bytes(mut self, max_inline_bytes: u64) -> Self {
    self.max_inline_bytes = max_inline_bytes;
    self
  }

  pub fn cache(&self) -> &AttachmentCache {
    &self.cache
  }

  pub async fn get_attachment(&self, url: &str, format: AttachmentFormat) -> AttachmentResponse {
    match format {
      AttachmentFormat::Metadata => AttachmentResponse::bare(url, format),
      AttachmentFormat::Url => AttachmentResponse {
        content: url.to_string(),
        ..AttachmentResponse::bare(url, format)
      },
      AttachmentFormat::Base64 => self.fetch(url).await.into_response(url),
    }
  }

  /// Run the `base64` pipeline: cache, download, resize, cache again.
  pub async fn fetch(&self, url: &str) -> AttachmentOutcome {
    let format = AttachmentFormat::Base64;

    if let Some(entry) = self.cache.get(url, format) {
      debug!(url, "Attachment cache hit");
      return AttachmentOutcome::Inline {
        entry,
        from_cache: true,
      };
    }

    let downloaded = match self.downloader.download(url).await {
      Ok(downloaded) => downloaded,
      Err(e) => return AttachmentOutcome::Failed(e),
    };

    let Downloaded {
      bytes,
      content_type,
      size,
    } = downloaded;
    let limit = self.max_inline_bytes;

    let entry = if is_image(&content_type) {
      let dimensions = self.images.dimensions(&bytes);

      if size > limit {
        match self.resize(bytes, &content_type).await {
          Ok(resized) => {
            info!(url, original = size, resized = resized.bytes.len(), "Resized attachment");
            AttachmentCacheEntry {
              size: resized.bytes.len() as u64,
              content: Arc::from(resized.bytes),
              content_type: resized.content_type,
              width: Some(resized.width),
              height: Some(resized.height),
              resized: true,
            }
          }
          Err(error) => {
            warn!(url, size, error = %error, "Image too large to inline");
            return AttachmentOutcome::Degraded {
              url: url.to_string(),
              content_type,
              size,
              reason: DegradeReason::ResizeFailed { size, limit, error },
            };
          }
        }
      } else {
        AttachmentCacheEntry {
          content: Arc::from(bytes),
          content_type,
          size,
          width: dimensions.map(|(w, _)| w),
          height: dimensions.map(|(_, h)| h),
          resized: false,
        }
      }
    } else if size > limit {
      warn!(url, size, "Attachment too large to inline");
      return AttachmentOutcome::Degraded {
        url: url.to_string(),
        content_type,
        size,
        reason: DegradeReason::TooLarge { size, limit },
      };
    } else {
      AttachmentCacheEntry {
        content: Arc::from(bytes),
        content_type,
        size,
        width: None,
        height: None,
        resized: false,
      }
    };

    self.cache.set(url, format, entry.clone());
    AttachmentOutcome::Inline {
      entry,
      from_cache: false,
    }
  }

  async fn resize(&self, bytes: Vec<u8>, content_type: &str) -> Result<ResizedImage, ResizeError> {
    let images = Arc::clone(&self.images);
    let content_type = content_type.to_string();
    let limit = self.max_inline_bytes;

    tokio::task::spawn_blocking(move || images.resize_to_fit(&bytes, &content_type, limit))
      .await
      .map_err(|e| ResizeError::Task(e.to_string()))?
  }

  /// Download `url` into the system temp directory with owner-only permissions.
  ///
  /// The file name is derived from the URL, so repeated calls overwrite the
  /// same file.
  pub async fn download_to_temp_file(&self, url: &str) -> Result<PathBuf, DownloadError> {
    let Downloaded {
      bytes,
      content_type,
      size,
    } = self.downloader.download(url).await?;
    let path = temp_file_path(url, &content_type);

    let target = path.clone();
    tokio::task::spawn_blocking(move || write_private(&target, &bytes))
      .await
      .unwrap_or_else(|e| Err(std::io::Error::other(e)))
      .map_err(|source| DownloadError::Io {
        path: path.clone(),
        source,
      })?;

    debug!(url, path = %path.display(), size, "Saved attachment");
    Ok(path)
  }
}

impl fmt::Debug for AttachmentClient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AttachmentClient")
      .field("downloader", &self.downloader)
      .field("cache_entries", &self.cache.len())
      .field("max_inline_bytes", &self.max_inline_bytes)
      .finish_non_exhaustive()
  }
}

fn is_image(content_type: &str) -> bool {
  content_type.trim().to_ascii_lowercase().starts_with("image/")
}

/// `<tmp>/linr-attachment-<first 16 hex of sha256(url)><ext>`
pub fn temp_file_path(url: &str, content_type: &str) -> PathBuf {
  let digest = hex::encode(Sha256::digest(url.as_bytes()));
  std::env::temp_dir().join(format!(
    "linr-attachment-{}{}",
    &digest[..16],
    extension_for(content_type)
  ))
}

/// File extension, with leading dot, for a content type.
pub fn extension_for(content_type: &str) -> String {
  let essence = content_type
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase();

  let preferred = match essence.as_str() {
    "image/jpeg" | "image/jpg" => Some("jpg"),
    "image/png" => Some("png"),
    "image/gif" => Some("gif"),
    "image/webp" => Some("webp"),
    "image/svg+xml" => Some("svg"),
    "application/pdf" => Some("pdf"),
    "text/plain" => Some("txt"),
    "application/json" => Some("json"),
    _ => None,
  };

  let ext = preferred.or_else(|| {
    mime_guess::get_mime_extensions_str(&essence).and_then(|exts| exts.first().copied())
  });

  match ext {
    Some(ext) => format!(".{}", ext),
    None => ".bin".to_string(),
  }
}

/// Write through a fresh owner-only file in the same directory, then rename it
/// over `path`. A symlink already sitting at `path` is replaced, never followed.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or(Path::new("."));

  let mut file = tempfile::Builder::new()
    .prefix(".linr-attachment-")
    .tempfile_in(dir)?;
  file.write_all(bytes)?;
  file.as_file().sync_all()?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    file
      .as_file()
      .set_permissions(std::fs::Permissions::from_mode(0o600))?;
  }

  file.persist(path).map_err(|e| e.error)?;
  Ok(())
}
