//! HTTP download of attachment bodies with auth, retry and a size cap.

use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::AttachmentsConfig;
use crate::linear::TokenProvider;

use super::error::DownloadError;
use super::retry::{retry_async, RetryConfig, RetryStats};

/// A fully buffered response body.
#[derive(Debug, Clone)]
pub struct Downloaded {
  pub bytes: Vec<u8>,
  pub content_type: String,
  pub size: u64,
}

pub struct Downloader {
  http: reqwest::Client,
  tokens: Arc<dyn TokenProvider>,
  private_upload_host: String,
  request_timeout: Duration,
  max_bytes: u64,
  retry: RetryConfig,
}

impl Downloader {
  pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
    Self::from_config(&AttachmentsConfig::default(), tokens)
  }

  pub fn from_config(config: &AttachmentsConfig, tokens: Arc<dyn TokenProvider>) -> Self {
    Self {
      http: reqwest::Client::new(),
      tokens,
      private_upload_host: config.private_upload_host.clone(),
      request_timeout: Duration::from_secs(config.request_timeout_secs),
      max_bytes: config.max_download_bytes,
      retry: RetryConfig::new()
        .with_max_retries(config.max_retries)
        .with_base_delay(Duration::from_millis(config.base_delay_ms)),
    }
  }

  pub fn with_private_upload_host(mut self, host: impl Into<String>) -> Self {
    self.private_upload_host = host.into();
    self
  }

  pub fn with_retry(mut self, retry: RetryConfig) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
    self.max_bytes = max_bytes;
    self
  }

  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }

  pub fn private_upload_host(&self) -> &str {
    &self.private_upload_host
  }

  /// Download `url`, retrying transient failures with exponential backoff.
  pub async fn download(&self, url: &str) -> Result<Downloaded, DownloadError> {
    self.download_with_stats(url).await.0
  }

  /// Like [`Downloader::download`], also reporting how many attempts were made.
  pub async fn download_with_stats(&self, url: &str) -> (Result<Downloaded, DownloadError>, RetryStats) {
    let parsed = match parse_url(url) {
      Ok(parsed) => parsed,
      Err(e) => return (Err(e), RetryStats::default()),
    };

    let (result, stats) =
      retry_async(&self.retry, || self.attempt(&parsed), DownloadError::is_retryable).await;

    match &result {
      Ok(downloaded) => debug!(
        url = %parsed,
        size = downloaded.size,
        content_type = %downloaded.content_type,
        attempts = stats.attempts,
        "Downloaded attachment"
      ),
      Err(e) => warn!(url = %parsed, attempts = stats.attempts, error = %e, "Attachment download failed"),
    }

    (result, stats)
  }

  async fn attempt(&self, url: &Url) -> Result<Downloaded, DownloadError> {
    let mut request = self.http.get(url.clone()).timeout(self.request_timeout);

    if is_private_upload_url(url, &self.private_upload_host) {
      let token = self
        .tokens
        .token()
        .map_err(|e| DownloadError::Token(e.to_string()))?;
      request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(DownloadError::from_reqwest)?;
    check_status(&response)?;

    if response.content_length().is_some_and(|len| len > self.max_bytes) {
      return Err(DownloadError::TooLarge {
        limit: self.max_bytes,
      });
    }

    let header_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .map(String::from);

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
      let chunk = chunk.map_err(DownloadError::from_reqwest)?;
      if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
        return Err(DownloadError::TooLarge {
          limit: self.max_bytes,
        });
      }
      bytes.extend_from_slice(&chunk);
    }

    let content_type = header_type.unwrap_or_else(|| sniff_content_type(&bytes).to_string());

    Ok(Downloaded {
      size: bytes.len() as u64,
      bytes,
      content_type,
    })
  }
}

impl std::fmt::Debug for Downloader {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Downloader")
      .field("private_upload_host", &self.private_upload_host)
      .field("request_timeout", &self.request_timeout)
      .field("max_bytes", &self.max_bytes)
      .field("retry", &self.retry)
      .finish_non_exhaustive()
  }
}

fn parse_url(url: &str) -> Result<Url, DownloadError> {
  let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
    url: url.to_string(),
    reason: e.to_string(),
  })?;
  match parsed.scheme() {
    "http" | "https" => Ok(parsed),
    other => Err(DownloadError::InvalidUrl {
      url: url.to_string(),
      reason: format!("unsupported scheme '{}'", other),
    }),
  }
}

fn check_status(response: &reqwest::Response) -> Result<(), DownloadError> {
  let status = response.status();
  match status {
    StatusCode::OK => Ok(()),
    StatusCode::NOT_FOUND => Err(DownloadError::NotFound),
    StatusCode::FORBIDDEN => Err(DownloadError::Forbidden),
    StatusCode::UNAUTHORIZED => Err(DownloadError::Unauthorized),
    StatusCode::TOO_MANY_REQUESTS => Err(DownloadError::RateLimited {
      retry_after: response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(String::from),
    }),
    s if s.is_server_error() => Err(DownloadError::Server {
      status: s.as_u16(),
    }),
    s => Err(DownloadError::Status {
      status: s.as_u16(),
    }),
  }
}

/// Exact, case-insensitive host comparison. Subdomains and lookalikes do not match.
pub fn is_private_upload_url(url: &Url, private_upload_host: &str) -> bool {
  url
    .host_str()
    .is_some_and(|host| host.eq_ignore_ascii_case(private_upload_host))
}

/// Content type from the body when the server sent none.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
  if let Ok(format) = image::guess_format(bytes) {
    return format.to_mime_type();
  }
  if bytes.starts_with(b"%PDF-") {
    return "application/pdf";
  }
  if std::str::from_utf8(bytes).is_ok() {
    return "text/plain; charset=utf-8";
  }
  "application/octet-stream"
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use mockito::Matcher;

  use crate::linear::StaticToken;

  struct FailingTokens;

  impl TokenProvider for FailingTokens {
    fn token(&self) -> color_eyre::Result<String> {
      Err(eyre!("no credentials configured"))
    }
  }

  fn downloader(host: &str) -> Downloader {
    Downloader::new(Arc::new(StaticToken("secret-token".into())))
      .with_private_upload_host(host)
      .with_retry(
        RetryConfig::new()
          .with_base_delay(Duration::from_millis(1))
          .with_jitter(0.0),
      )
  }

  #[test]
  fn test_private_host_is_exact_match() {
    let host = "uploads.linear.app";
    let check = |u: &str| is_private_upload_url(&Url::parse(u).unwrap(), host);

    assert!(check("https://uploads.linear.app/abc/def.png"));
    assert!(check("https://UPLOADS.Linear.APP/abc"));
    assert!(!check("https://uploads.linear.app.evil.com/abc"));
    assert!(!check("https://evil-uploads.linear.app/abc"));
    assert!(!check("https://cdn.uploads.linear.app/abc"));
    assert!(!check("https://example.com/uploads.linear.app/abc"));
  }

  #[test]
  fn test_sniff_content_type() {
    assert_eq!(sniff_content_type(b"\x89PNG\r\n\x1a\n\0\0\0\0"), "image/png");
    assert_eq!(sniff_content_type(b"%PDF-1.7 ..."), "application/pdf");
    assert_eq!(sniff_content_type(b"hello"), "text/plain; charset=utf-8");
    assert_eq!(sniff_content_type(&[0xff, 0x00, 0xfe]), "application/octet-stream");
  }

  #[tokio::test]
  async fn test_invalid_url_makes_no_request() {
    let err = downloader("uploads.linear.app")
      .download("ftp://uploads.linear.app/x")
      .await
      .unwrap_err();
    assert!(matches!(err, DownloadError::InvalidUrl { .. }));

    let err = downloader("uploads.linear.app")
      .download("::nope::")
      .await
      .unwrap_err();
    assert!(matches!(err, DownloadError::InvalidUrl { .. }));
  }

  #[tokio::test]
  async fn test_download_success_uses_header_content_type() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/file.txt")
      .with_status(200)
      .with_header("content-type", "text/markdown")
      .with_body("# notes")
      .expect(1)
      .create_async()
      .await;

    let downloaded = downloader("uploads.linear.app")
      .download(&format!("{}/file.txt", server.url()))
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(downloaded.bytes, b"# notes");
    assert_eq!(downloaded.size, 7);
    assert_eq!(downloaded.content_type, "text/markdown");
  }

  #[tokio::test]
  async fn test_server_error_is_retried_to_budget() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/flaky")
      .with_status(503)
      .expect(4)
      .create_async()
      .await;

    let err = downloader("uploads.linear.app")
      .download(&format!("{}/flaky", server.url()))
      .await
      .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, DownloadError::Server { status: 503 }));
  }

  #[tokio::test]
  async fn test_not_found_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/gone")
      .with_status(404)
      .expect(1)
      .create_async()
      .await;

    let err = downloader("uploads.linear.app")
      .download(&format!("{}/gone", server.url()))
      .await
      .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, DownloadError::NotFound));
    assert!(err.to_string().contains("404"));
  }

  #[tokio::test]
  async fn test_status_mapping() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/403").with_status(403).create_async().await;
    server.mock("GET", "/401").with_status(401).create_async().await;
    server
      .mock("GET", "/429")
      .with_status(429)
      .with_header("retry-after", "30")
      .create_async()
      .await;
    server.mock("GET", "/302").with_status(302).create_async().await;

    let d = downloader("uploads.linear.app").with_retry(RetryConfig::new().with_max_retries(0));
    let get = |path: &str| format!("{}{}", server.url(), path);

    assert!(matches!(
      d.download(&get("/403")).await,
      Err(DownloadError::Forbidden)
    ));
    assert!(matches!(
      d.download(&get("/401")).await,
      Err(DownloadError::Unauthorized)
    ));
    let err = d.download(&get("/429")).await.unwrap_err();
    assert!(err.to_string().contains("retry after 30"));
    assert!(matches!(
      d.download(&get("/302")).await,
      Err(DownloadError::Status { status: 302 })
    ));
  }

  #[tokio::test]
  async fn test_private_host_gets_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/private.png")
      .match_header("authorization", "Bearer secret-token")
      .with_status(200)
      .with_body("ok")
      .expect(1)
      .create_async()
      .await;

    // mockito listens on 127.0.0.1, so treat that as the private host
    downloader("127.0.0.1")
      .download(&format!("{}/private.png", server.url()))
      .await
      .unwrap();

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_other_hosts_get_no_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/public.png")
      .match_header("authorization", Matcher::Missing)
      .with_status(200)
      .with_body("ok")
      .expect(2)
      .create_async()
      .await;

    let url = format!("{}/public.png", server.url());
    downloader("uploads.linear.app").download(&url).await.unwrap();
    // Prefix of the real host is still a different host
    downloader("127.0.0.1.evil").download(&url).await.unwrap();

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_token_failure_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", Matcher::Any)
      .expect(0)
      .create_async()
      .await;

    let err = Downloader::new(Arc::new(FailingTokens))
      .with_private_upload_host("127.0.0.1")
      .download(&format!("{}/private.png", server.url()))
      .await
      .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, DownloadError::Token(_)));
    assert!(err.to_string().contains("no credentials configured"));
  }

  #[tokio::test]
  async fn test_body_over_limit_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/big")
      .with_status(200)
      .with_body(vec![b'a'; 11])
      .expect(1)
      .create_async()
      .await;
    server
      .mock("GET", "/exact")
      .with_status(200)
      .with_body(vec![b'a'; 10])
      .create_async()
      .await;

    let d = downloader("uploads.linear.app").with_max_bytes(10);

    let err = d.download(&format!("{}/big", server.url())).await.unwrap_err();
    mock.assert_async().await;
    assert!(matches!(err, DownloadError::TooLarge { limit: 10 }));

    let ok = d.download(&format!("{}/exact", server.url())).await.unwrap();
    assert_eq!(ok.size, 10);
  }

  #[tokio::test]
  async fn test_connection_refused_is_retried() {
    // Bind then drop to get a port nothing listens on
    let port = std::net::TcpListener::bind("127.0.0.1:0")
      .unwrap()
      .local_addr()
      .unwrap()
      .port();

    let (result, stats) = downloader("uploads.linear.app")
      .download_with_stats(&format!("http://127.0.0.1:{}/file.png", port))
      .await;

    assert!(matches!(result, Err(DownloadError::Network(_))));
    assert_eq!(stats.attempts, 4);
  }

  #[tokio::test]
  async fn test_rate_limit_is_retried_to_budget() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/busy")
      .with_status(429)
      .with_header("retry-after", "1")
      .expect(4)
      .create_async()
      .await;

    let (result, stats) = downloader("uploads.linear.app")
      .download_with_stats(&format!("{}/busy", server.url()))
      .await;

    mock.assert_async().await;
    assert!(matches!(
      result,
      Err(DownloadError::RateLimited { retry_after: Some(ref v) }) if v == "1"
    ));
    assert_eq!(stats.attempts, 4);
  }

  #[tokio::test]
  async fn test_timeout_is_retried() {
    // Accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let silent = tokio::spawn(async move {
      let mut held = Vec::new();
      while let Ok((socket, _)) = listener.accept().await {
        held.push(socket);
      }
    });

    let (result, stats) = downloader("uploads.linear.app")
      .with_request_timeout(Duration::from_millis(50))
      .download_with_stats(&format!("http://{}/slow.png", addr))
      .await;

    silent.abort();
    assert!(matches!(result, Err(DownloadError::Timeout(_))));
    assert_eq!(stats.attempts, 4);
  }

  #[tokio::test]
  async fn test_invalid_url_reports_no_attempts() {
    let (result, stats) = downloader("uploads.linear.app")
      .download_with_stats("not a url")
      .await;

    assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    assert_eq!(stats.attempts, 0);
  }
}
