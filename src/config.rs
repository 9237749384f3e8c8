use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the application is served from; relative URLs resolve against it
  pub origin: Url,
  /// Version tag shared by both partition names. Bump it whenever the shell
  /// asset list or a caching policy changes.
  pub version: String,
  pub static_prefix: String,
  pub dynamic_prefix: String,
  /// Paths written into the static partition at install time
  pub shell_assets: Vec<String>,
  /// Path prefixes the gateway never touches
  pub excluded_prefixes: Vec<String>,
  /// URL schemes the gateway never touches (browser extension internals)
  pub excluded_schemes: Vec<String>,
  pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  /// Title used when a push payload carries none
  pub default_title: String,
  pub icon: String,
  pub badge: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: Url::parse("https://togo-immo.tg/").expect("static origin is a valid URL"),
      version: "v3".to_string(),
      static_prefix: "togo-immo-static".to_string(),
      dynamic_prefix: "togo-immo-dynamic".to_string(),
      shell_assets: [
        "/",
        "/properties",
        "/chap-chap",
        "/auth",
        "/manifest.json",
        "/icons/icon-72x72.png",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      excluded_prefixes: vec![
        "/admin".to_string(),
        "/messages".to_string(),
        "/api".to_string(),
      ],
      excluded_schemes: vec![
        "chrome-extension".to_string(),
        "moz-extension".to_string(),
        "safari-extension".to_string(),
      ],
      notifications: NotificationConfig::default(),
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      default_title: "Togo Immo".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/icon-72x72.png".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hors-ligne.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hors-ligne/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found, since the
  /// gateway has to come up without operator input.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hors-ligne.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hors-ligne").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.version.trim().is_empty() {
      return Err(eyre!("Config field `version` must not be empty"));
    }
    if self.static_partition() == self.dynamic_partition() {
      return Err(eyre!(
        "Static and dynamic partitions share the name {}",
        self.static_partition()
      ));
    }
    Ok(())
  }

  /// Name of the current static partition, e.g. `togo-immo-static-v3`.
  pub fn static_partition(&self) -> String {
    format!("{}-{}", self.static_prefix, self.version)
  }

  /// Name of the current dynamic partition, e.g. `togo-immo-dynamic-v3`.
  pub fn dynamic_partition(&self) -> String {
    format!("{}-{}", self.dynamic_prefix, self.version)
  }

  /// Resolve a path or absolute URL against the configured origin.
  pub fn resolve(&self, input: &str) -> Result<Url> {
    self
      .origin
      .join(input)
      .map_err(|e| eyre!("Invalid URL {}: {}", input, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_partition_names_share_version() {
    let config = Config::default();
    assert_eq!(config.static_partition(), "togo-immo-static-v3");
    assert_eq!(config.dynamic_partition(), "togo-immo-dynamic-v3");
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::parse("version: v4\nexcluded_prefixes: [\"/admin\"]\n").unwrap();
    assert_eq!(config.static_partition(), "togo-immo-static-v4");
    assert_eq!(config.excluded_prefixes, vec!["/admin".to_string()]);
    assert!(config.shell_assets.contains(&"/manifest.json".to_string()));
    assert_eq!(config.notifications.default_title, "Togo Immo");
  }

  #[test]
  fn test_clashing_partition_names_rejected() {
    let config = Config {
      dynamic_prefix: "same".to_string(),
      static_prefix: "same".to_string(),
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_resolve_relative_and_absolute() {
    let config = Config::default();
    assert_eq!(
      config.resolve("/manifest.json").unwrap().as_str(),
      "https://togo-immo.tg/manifest.json"
    );
    assert_eq!(
      config.resolve("https://cdn.example.com/a.png").unwrap().host_str(),
      Some("cdn.example.com")
    );
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let result = Config::load(Some(Path::new("/definitely/not/here.yaml")));
    assert!(result.is_err());
  }
}
