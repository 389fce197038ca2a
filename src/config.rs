use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the catalog API, e.g. https://api.example.com/api/v1
  pub base_url: Url,
}

/// Cache tuning. Defaults follow the listing view's needs: product data
/// goes stale quickly, categories rarely change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Seconds before product queries are considered stale.
  pub product_ttl_secs: u64,
  /// Seconds before category queries are considered stale.
  pub category_ttl_secs: u64,
  /// Seconds an unused entry is retained after its last subscriber leaves.
  pub retention_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      product_ttl_secs: 30,
      category_ttl_secs: 600,
      retention_secs: 300,
    }
  }
}

impl CacheConfig {
  pub fn product_ttl(&self) -> Duration {
    Duration::from_secs(self.product_ttl_secs)
  }

  pub fn category_ttl(&self) -> Duration {
    Duration::from_secs(self.category_ttl_secs)
  }

  pub fn retention(&self) -> Duration {
    Duration::from_secs(self.retention_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./prodhub.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/prodhub/config.yaml
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
        "No configuration file found. Create one at ~/.config/prodhub/config.yaml\n\
                 with at least:\n\napi:\n  base_url: https://your-api.example.com/api/v1"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("prodhub.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("prodhub").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
