use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::manifest::Manifest;
use crate::net::OFFLINE_PAGE;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Name of the current cache generation. Change it whenever the manifest changes.
  pub generation: String,
  /// Origin that relative manifest entries and request URLs are resolved against
  pub origin: String,
  /// Root document name treated as equivalent to `/`
  #[serde(default = "default_root_document")]
  pub root_document: String,
  /// Assets pre-fetched into the generation on install
  #[serde(default)]
  pub manifest: Vec<String>,
  #[serde(default)]
  pub provisioning: ProvisioningMode,
  /// HTML served when a cacheable request can't reach the network
  pub offline_page: Option<String>,
  /// Also write logs to this file (relative paths live in the data directory)
  pub log_file: Option<PathBuf>,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub network: NetworkConfig,
}

fn default_root_document() -> String {
  "index.html".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningMode {
  /// Any unretrievable manifest entry fails the whole install; nothing is stored
  #[default]
  Strict,
  /// Unretrievable entries are skipped, the rest are stored
  BestEffort,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite database path (default: $XDG_DATA_HOME/shellcache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: Option<u64>,
  pub user_agent: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: None,
      user_agent: concat!("shellcache/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

/// Immutable settings the cache manager is constructed with.
#[derive(Debug, Clone)]
pub struct CacheConfig {
  pub generation: String,
  pub origin: Url,
  pub manifest: Manifest,
  pub provisioning: ProvisioningMode,
  pub offline_page: String,
}

impl CacheConfig {
  pub fn new(generation: impl Into<String>, origin: Url, manifest: Manifest) -> Self {
    Self {
      generation: generation.into(),
      origin,
      manifest,
      provisioning: ProvisioningMode::default(),
      offline_page: OFFLINE_PAGE.to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
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
        "No configuration file found. Create one at ~/.config/shellcache/config.yaml\n\
                 See shellcache.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
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
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.generation.trim().is_empty() {
      return Err(eyre!("`generation` must not be empty"));
    }
    if self.root_document.trim_start_matches('/').is_empty() {
      return Err(eyre!("`root_document` must name a document"));
    }
    self.origin_url()?;
    Ok(())
  }

  fn origin_url(&self) -> Result<Url> {
    let origin = Url::parse(&self.origin)
      .map_err(|e| eyre!("`origin` must be an absolute URL ({}): {}", self.origin, e))?;
    if origin.cannot_be_a_base() {
      return Err(eyre!("`origin` can't be used as a base URL: {}", self.origin));
    }
    Ok(origin)
  }

  /// The immutable view handed to the cache manager.
  pub fn cache_config(&self) -> Result<CacheConfig> {
    let manifest = Manifest::parse(self.manifest.as_slice(), &self.root_document);
    let mut cache = CacheConfig::new(self.generation.clone(), self.origin_url()?, manifest);
    cache.provisioning = self.provisioning;
    if let Some(page) = &self.offline_page {
      cache.offline_page = page.clone();
    }
    Ok(cache)
  }

  /// Directory for the cache database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shellcache"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  const MINIMAL: &str = "generation: v1\norigin: https://app.example.com/\n";

  #[test]
  fn test_minimal_config_defaults() {
    let config = Config::from_yaml(MINIMAL).unwrap();
    assert_eq!(config.generation, "v1");
    assert_eq!(config.root_document, "index.html");
    assert!(config.manifest.is_empty());
    assert_eq!(config.provisioning, ProvisioningMode::Strict);
    assert!(config.storage.path.is_none());
    assert!(config.network.timeout_secs.is_none());
    assert!(config.network.user_agent.starts_with("shellcache/"));
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
generation: ultimate-coder-cache-v1.1
origin: https://app.example.com/
root_document: home.html
provisioning: best_effort
offline_page: "<p>offline</p>"
manifest:
  - /
  - style.css
  - https://cdn.tailwindcss.com
storage:
  path: /tmp/cache.db
network:
  timeout_secs: 10
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.provisioning, ProvisioningMode::BestEffort);
    assert_eq!(config.network.timeout_secs, Some(10));
    assert!(config.network.user_agent.starts_with("shellcache/"));

    let cache = config.cache_config().unwrap();
    assert_eq!(cache.generation, "ultimate-coder-cache-v1.1");
    assert_eq!(cache.manifest.len(), 3);
    assert_eq!(cache.offline_page, "<p>offline</p>");
    assert_eq!(cache.provisioning, ProvisioningMode::BestEffort);
  }

  #[test]
  fn test_default_offline_page() {
    let cache = Config::from_yaml(MINIMAL).unwrap().cache_config().unwrap();
    assert_eq!(cache.offline_page, OFFLINE_PAGE);
  }

  #[test]
  fn test_rejects_empty_generation() {
    let err = Config::from_yaml("generation: ' '\norigin: https://a.example/\n").unwrap_err();
    assert!(err.to_string().contains("generation"));
  }

  #[test]
  fn test_rejects_relative_origin() {
    assert!(Config::from_yaml("generation: v1\norigin: /app\n").is_err());
  }

  #[test]
  fn test_example_config_parses() {
    let config = Config::from_yaml(include_str!("../shellcache.example.yaml")).unwrap();
    assert_eq!(config.network.timeout_secs, Some(30));

    let cache = config.cache_config().unwrap();
    assert_eq!(cache.generation, "ultimate-coder-cache-v1.1");
    assert_eq!(cache.origin.as_str(), "https://coder.example.com/");
    assert_eq!(cache.manifest.len(), config.manifest.len());
    assert_eq!(cache.manifest.len(), 21);
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.origin, "https://app.example.com/");
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/shellcache.yaml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
  }
}
