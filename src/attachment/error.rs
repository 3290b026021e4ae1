use std::path::PathBuf;
use thiserror::Error;

/// Why an attachment download failed.
#[derive(Debug, Error)]
pub enum DownloadError {
  #[error("invalid attachment URL '{url}': {reason}")]
  InvalidUrl { url: String, reason: String },

  /// The token provider failed. No request was sent.
  #[error(
    "failed to get an auth token for a private upload: {0}. \
     Re-authenticate (set LINR_API_KEY or LINR_OAUTH_TOKEN) and try again"
  )]
  Token(String),

  #[error("attachment not found (HTTP 404): it may have been deleted or the URL is wrong")]
  NotFound,

  #[error("access denied (HTTP 403): you may not have permission to view this attachment")]
  Forbidden,

  #[error("authentication failed (HTTP 401): the token may be expired, re-authenticate and try again")]
  Unauthorized,

  #[error("rate limited (HTTP 429){}", retry_after_suffix(.retry_after))]
  RateLimited { retry_after: Option<String> },

  #[error("upload server error (HTTP {status})")]
  Server { status: u16 },

  #[error("unexpected HTTP status {status}")]
  Status { status: u16 },

  #[error("attachment is larger than the {limit} byte download limit")]
  TooLarge { limit: u64 },

  #[error("request timed out: {0}")]
  Timeout(#[source] reqwest::Error),

  #[error("network error: {0}")]
  Network(#[source] reqwest::Error),

  #[error("failed to write {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl DownloadError {
  /// Transient failures worth another attempt: connectivity, timeouts, 5xx and 429.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      DownloadError::Network(_)
        | DownloadError::Timeout(_)
        | DownloadError::Server { .. }
        | DownloadError::RateLimited { .. }
    )
  }

  pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      DownloadError::Timeout(e)
    } else {
      DownloadError::Network(e)
    }
  }
}

fn retry_after_suffix(retry_after: &Option<String>) -> String {
  match retry_after {
    Some(value) => format!(", retry after {}", value),
    None => String::new(),
  }
}
