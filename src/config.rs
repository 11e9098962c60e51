use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
  /// Who cache entries belong to; see [`Config::principal`].
  pub principal: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  /// Per-request timeout; none when unset
  pub timeout_secs: Option<u64>,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

/// Cache scope used when no principal is configured.
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

fn default_user_agent() -> String {
  format!("datapipe/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// SQLite file; defaults to $XDG_DATA_HOME/datapipe/cache.db
  pub path: Option<PathBuf>,
  /// Entries older than this read as misses
  pub max_age_secs: Option<u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      max_age_secs: None,
    }
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// `EnvFilter` directives, overridden by RUST_LOG
  #[serde(default = "default_log_filter")]
  pub filter: String,
  /// Where the rolling log files go; defaults to $XDG_STATE_HOME/datapipe
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      filter: default_log_filter(),
      directory: None,
    }
  }
}

fn default_log_filter() -> String {
  "datapipe=info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./datapipe.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/datapipe/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/datapipe/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("datapipe.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("datapipe").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.api.base_url.trim().is_empty() {
      return Err(eyre!("api.base_url must not be empty"));
    }
    Ok(config)
  }

  /// Configured principal, or "anonymous" when none is set or it is blank.
  pub fn principal(&self) -> &str {
    self
      .principal
      .as_deref()
      .map(str::trim)
      .filter(|p| !p.is_empty())
      .unwrap_or(ANONYMOUS_PRINCIPAL)
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.api.timeout_secs.map(Duration::from_secs)
  }

  pub fn cache_max_age(&self) -> Option<chrono::Duration> {
    self
      .cache
      .max_age_secs
      .and_then(|secs| i64::try_from(secs).ok())
      .map(chrono::Duration::seconds)
  }

  /// Get the API token from the environment, if one is set.
  ///
  /// Checks DATAPIPE_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("DATAPIPE_API_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }

  /// Get the sign-in password from environment variables.
  ///
  /// Checks DATAPIPE_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("DATAPIPE_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set DATAPIPE_PASSWORD environment variable."))
  }
}
