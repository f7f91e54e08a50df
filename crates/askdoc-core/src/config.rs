//! Configuration management for askdoc.
//!
//! Loads configuration from ${ASKDOC_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::SessionContext;
use crate::stream::PumpOptions;

/// Environment variable that overrides `base_url`.
pub const BASE_URL_ENV: &str = "ASKDOC_BASE_URL";

/// Returns the default config template with comments.
///
/// This is embedded from `default_config.toml` at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for askdoc configuration and data directories.
    //!
    //! `ASKDOC_HOME` resolution order:
    //! 1. `ASKDOC_HOME` environment variable (if set)
    //! 2. ~/.config/askdoc (default)

    use std::path::PathBuf;

    /// Returns the askdoc home directory.
    pub fn askdoc_home() -> PathBuf {
        if let Ok(home) = std::env::var("ASKDOC_HOME")
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }

        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        home.join(".config").join("askdoc")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        askdoc_home().join("config.toml")
    }

    /// Returns the directory rolling log files are written to.
    pub fn logs_dir() -> PathBuf {
        askdoc_home().join("logs")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL (serves /chat/stream and /upload)
    pub base_url: String,

    /// Session id used for retrieval and uploads
    pub session_id: String,

    /// Stall window for the answer stream in seconds (0 disables)
    pub stall_timeout_secs: u32,

    /// TCP connect timeout in seconds (0 uses the client default)
    pub connect_timeout_secs: u32,

    /// Render width in columns (0 follows the terminal)
    pub render_width: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            session_id: SessionContext::DEFAULT_SESSION_ID.to_string(),
            stall_timeout_secs: 0,
            connect_timeout_secs: Self::DEFAULT_CONNECT_TIMEOUT_SECS,
            render_width: 0,
        }
    }
}

impl Config {
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
    const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 10;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Resolves the backend base URL with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the chosen URL is not a valid absolute URL.
    pub fn effective_base_url(&self) -> Result<String> {
        let env_url = std::env::var(BASE_URL_ENV).ok();
        resolve_base_url(env_url.as_deref(), Some(&self.base_url))
    }

    pub fn session(&self) -> SessionContext {
        SessionContext::new(self.session_id.as_str())
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        if self.stall_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.stall_timeout_secs)))
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.connect_timeout_secs)))
        }
    }

    pub fn pump_options(&self) -> PumpOptions {
        PumpOptions {
            stall_timeout: self.stall_timeout(),
        }
    }

    /// Render width override, if configured.
    pub fn render_width(&self) -> Option<usize> {
        (self.render_width > 0).then_some(usize::from(self.render_width))
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Saves only the `base_url` field to the config file.
    ///
    /// Creates the file from the template if it doesn't exist. Preserves
    /// existing fields and comments using `toml_edit`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the file cannot be updated.
    pub fn save_base_url_to(path: &Path, base_url: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let base_url = resolve_base_url(None, Some(base_url))?;

        let contents = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["base_url"] = value(base_url);

        Self::write_config(path, &doc.to_string())
    }

    fn write_config(path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
        }
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

/// Resolves a base URL with precedence: env > config > default.
///
/// Blank values are skipped. The chosen value is validated and returned
/// without a trailing slash.
///
/// # Errors
/// Returns an error if the chosen URL is not a valid absolute URL.
pub fn resolve_base_url(env_url: Option<&str>, config_url: Option<&str>) -> Result<String> {
    let chosen = [env_url, config_url]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty())
        .unwrap_or(Config::DEFAULT_BASE_URL);

    let parsed =
        url::Url::parse(chosen).with_context(|| format!("Invalid backend base URL: {chosen}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("Backend base URL must use http or https: {chosen}");
    }

    Ok(chosen.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.session_id, "default_user");
        assert!(config.stall_timeout().is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "session_id = \"alice\"\nstall_timeout_secs = 30\n").unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.session().session_id(), "alice");
        assert_eq!(config.stall_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.base_url, Config::DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "base_url = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::init(&path).unwrap();
        assert!(path.exists());
        assert!(Config::init(&path).is_err());
    }

    #[test]
    fn test_save_base_url_preserves_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::init(&path).unwrap();

        Config::save_base_url_to(&path, "https://qa.example.com/").unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("# Question-answering backend"));
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.base_url, "https://qa.example.com");
    }

    #[test]
    fn test_save_base_url_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(Config::save_base_url_to(&path, "not a url").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_resolve_base_url_precedence() {
        assert_eq!(
            resolve_base_url(Some("http://env:1"), Some("http://cfg:2")).unwrap(),
            "http://env:1"
        );
        assert_eq!(
            resolve_base_url(Some("  "), Some("http://cfg:2/")).unwrap(),
            "http://cfg:2"
        );
        assert_eq!(
            resolve_base_url(None, None).unwrap(),
            Config::DEFAULT_BASE_URL
        );
        assert!(resolve_base_url(Some("ftp://files"), None).is_err());
    }
}
