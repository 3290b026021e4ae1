use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::linear::TokenProvider;

pub const DEFAULT_API_URL: &str = "https://api.linear.app/graphql";
pub const DEFAULT_PRIVATE_UPLOAD_HOST: &str = "uploads.linear.app";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub linear: LinearConfig,
  pub cache: CacheConfig,
  pub attachments: AttachmentsConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
  /// Acting as a human user - people are assigned
  #[default]
  User,
  /// Acting as an OAuth application - users are delegated
  Agent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
  pub api_url: String,
  pub auth_mode: AuthMode,
  /// Team key or name used when a command needs a team and none was given
  pub default_team: Option<String>,
}

impl Default for LinearConfig {
  fn default() -> Self {
    Self {
      api_url: DEFAULT_API_URL.to_string(),
      auth_mode: AuthMode::default(),
      default_team: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub resolver_ttl_secs: u64,
  pub attachment_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      resolver_ttl_secs: 5 * 60,
      attachment_ttl_secs: 30 * 60,
    }
  }
}

impl CacheConfig {
  pub fn resolver_ttl(&self) -> Duration {
    Duration::from_secs(self.resolver_ttl_secs)
  }

  pub fn attachment_ttl(&self) -> Duration {
    Duration::from_secs(self.attachment_ttl_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttachmentsConfig {
  /// Host whose URLs need the bearer token (exact match)
  pub private_upload_host: String,
  /// Largest payload returned inline as base64
  pub max_inline_bytes: u64,
  /// Hard ceiling on any download
  pub max_download_bytes: u64,
  pub request_timeout_secs: u64,
  pub max_retries: u32,
  pub base_delay_ms: u64,
}

impl Default for AttachmentsConfig {
  fn default() -> Self {
    Self {
      private_upload_host: DEFAULT_PRIVATE_UPLOAD_HOST.to_string(),
      max_inline_bytes: 1024 * 1024,
      max_download_bytes: 100 * 1024 * 1024,
      request_timeout_secs: 30,
      max_retries: 3,
      base_delay_ms: 200,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Append logs to this file in addition to stderr
  pub file: Option<PathBuf>,
  /// EnvFilter directive, overridden by LINR_LOG
  pub filter: Option<String>,
}

/// Credentials used against the GraphQL API.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
  /// Personal API key, sent verbatim
  ApiKey(String),
  /// OAuth access token, sent as a bearer token
  OAuth(String),
}

impl Credentials {
  pub fn authorization_header(&self) -> String {
    match self {
      Credentials::ApiKey(key) => key.clone(),
      Credentials::OAuth(token) => format!("Bearer {}", token),
    }
  }

  pub fn token(&self) -> &str {
    match self {
      Credentials::ApiKey(t) | Credentials::OAuth(t) => t,
    }
  }
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Credentials::ApiKey(_) => f.write_str("ApiKey(***)"),
      Credentials::OAuth(_) => f.write_str("OAuth(***)"),
    }
  }
}

/// Environment variable naming a config file, used when `--config` is absent.
pub const CONFIG_ENV: &str = "LINR_CONFIG";

impl Config {
  /// Load from `--config`, then `$LINR_CONFIG`, then `./linr.yaml`, then
  /// `$XDG_CONFIG_HOME/linr/config.yaml`. A named file that does not exist is
  /// an error; finding no file at all yields defaults.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let from_env = std::env::var_os(CONFIG_ENV)
      .filter(|v| !v.is_empty())
      .map(PathBuf::from);
    Self::load_with(explicit_path, from_env.as_deref())
  }

  fn load_with(explicit_path: Option<&Path>, from_env: Option<&Path>) -> Result<Self> {
    let path = match explicit_path.or(from_env) {
      Some(named) if !named.is_file() => {
        return Err(eyre!("Config file not found: {}", named.display()));
      }
      Some(named) => Some(named.to_path_buf()),
      None => search_paths().into_iter().find(|p| p.is_file()),
    };

    match path {
      Some(p) => Self::from_yaml_file(&p),
      None => Ok(Self::default()),
    }
  }

  fn from_yaml_file(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Get Linear credentials from environment variables.
  ///
  /// Checks LINR_API_KEY, then LINEAR_API_KEY, then LINR_OAUTH_TOKEN.
  pub fn get_credentials() -> Result<Credentials> {
    let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    if let Some(key) = non_empty("LINR_API_KEY").or_else(|| non_empty("LINEAR_API_KEY")) {
      return Ok(Credentials::ApiKey(key.trim().to_string()));
    }
    if let Some(token) = non_empty("LINR_OAUTH_TOKEN") {
      return Ok(Credentials::OAuth(token.trim().to_string()));
    }

    Err(eyre!(
      "Linear credentials not found. Set LINR_API_KEY (or LINEAR_API_KEY) for a personal API key, \
       or LINR_OAUTH_TOKEN for an OAuth access token."
    ))
  }
}

/// Implicit config locations, most specific first.
fn search_paths() -> Vec<PathBuf> {
  let mut paths = vec![PathBuf::from("linr.yaml")];
  paths.extend(dirs::config_dir().map(|dir| dir.join("linr").join("config.yaml")));
  paths
}

/// Token provider that reads credentials from the environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvTokenProvider;

impl TokenProvider for EnvTokenProvider {
  fn token(&self) -> Result<String> {
    Config::get_credentials().map(|c| c.token().to_string())
  }
}
