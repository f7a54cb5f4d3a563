//! Configuration loading for muninnd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.muninn/config.toml` (user)
//! 3. `/etc/muninn/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.muninn/secrets.toml` (user, must be 0600)
//! 2. `/etc/muninn/secrets.toml` (system, must be 0600)
//!
//! Cache tunables start from the `MUNINN_*` environment (see
//! [`CacheConfig::from_env()`]) and are overridden by the `[cache]` table.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::CacheConfig;
use crate::{MuninnError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub invalidation: InvalidationConfig,
    #[serde(default)]
    pub cache: CacheOverrides,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:9742).
    #[serde(default = "default_address")]
    pub address: String,
    /// Run the background refresh loop (default: true).
    #[serde(default = "default_true")]
    pub refresh_loop: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            refresh_loop: true,
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:9742".to_string()
}

fn default_true() -> bool {
    true
}

/// Where events come from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    /// Primary upstream serving a JSON event list.
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Request timeout for the primary, in seconds (default: 15).
    #[serde(default)]
    pub remote_timeout_secs: Option<u64>,
    /// Secondary store export, tried before the fallback file.
    #[serde(default)]
    pub store_file: Option<PathBuf>,
    /// Last-resort snapshot on disk.
    #[serde(default)]
    pub fallback_file: Option<PathBuf>,
}

/// Page-cache purge webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidationConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// `[cache]` overrides applied on top of the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheOverrides {
    pub cache_duration_secs: Option<u64>,
    pub remote_refresh_interval_secs: Option<u64>,
    pub max_cache_age_secs: Option<u64>,
    pub cache_extension_secs: Option<u64>,
    pub max_memory_mb: Option<usize>,
    pub max_retry_attempts: Option<u32>,
    pub bootstrap_mode: Option<bool>,
    pub verbose_logging: Option<bool>,
    pub always_purge_on_refresh: Option<bool>,
    pub invalidation_paths: Option<Vec<String>>,
}

impl CacheOverrides {
    /// Apply the overrides to `base`.
    pub fn apply(&self, mut base: CacheConfig) -> CacheConfig {
        if let Some(secs) = self.cache_duration_secs {
            base.cache_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = self.remote_refresh_interval_secs {
            base.remote_refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.max_cache_age_secs {
            base.max_cache_age = Duration::from_secs(secs);
        }
        if let Some(secs) = self.cache_extension_secs {
            base.cache_extension_duration = Duration::from_secs(secs);
        }
        if let Some(mb) = self.max_memory_mb {
            base.max_memory_usage = mb.saturating_mul(1024 * 1024);
        }
        if let Some(n) = self.max_retry_attempts {
            base.max_retry_attempts = n;
        }
        if let Some(enabled) = self.bootstrap_mode {
            base.bootstrap_mode = enabled;
        }
        if let Some(enabled) = self.verbose_logging {
            base.verbose_logging = enabled;
        }
        if let Some(enabled) = self.always_purge_on_refresh {
            base.always_purge_on_refresh = enabled;
        }
        if let Some(paths) = &self.invalidation_paths {
            base.invalidation_paths = paths.clone();
        }
        base
    }
}

/// Secrets configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    /// Capability token for administrative calls.
    #[serde(default)]
    pub admin_token: Option<String>,
    /// Bearer token sent to the primary upstream.
    #[serde(default)]
    pub upstream_token: Option<String>,
    /// Bearer secret sent to the purge webhook.
    #[serde(default)]
    pub purge_secret: Option<String>,
}

/// Candidate locations for `file`, user directory first.
fn search_paths(file: &str) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(2);
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".muninn").join(file));
    }
    paths.push(Path::new("/etc/muninn").join(file));
    paths
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path, kind: &str) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        MuninnError::Configuration(format!("cannot read {kind} file {}: {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        MuninnError::Configuration(format!("invalid {kind} file {}: {e}", path.display()))
    })
}

impl Config {
    /// Load configuration from `explicit_path`, or the first of
    /// `~/.muninn/config.toml` and `/etc/muninn/config.toml` that exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) if path.exists() => path.to_path_buf(),
            Some(path) => {
                return Err(MuninnError::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            None => search_paths("config.toml")
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| {
                    MuninnError::Configuration(
                        "no config file; create ~/.muninn/config.toml or /etc/muninn/config.toml"
                            .to_string(),
                    )
                })?,
        };
        read_toml(&path, "config")
    }

    /// Environment-derived cache config with `[cache]` overrides, validated.
    pub fn cache_config(&self) -> Result<CacheConfig> {
        let config = self.cache.apply(CacheConfig::from_env()?);
        config.validate()?;
        Ok(config)
    }
}

impl Secrets {
    /// Load `secrets.toml` from the user or system directory.
    ///
    /// Missing file means empty secrets; each secret then falls back to its
    /// environment variable.
    pub fn load() -> Result<Self> {
        match search_paths("secrets.toml").into_iter().find(|p| p.exists()) {
            Some(path) => {
                ensure_private(&path)?;
                read_toml(&path, "secrets")
            }
            None => Ok(Self::default()),
        }
    }

    pub fn admin_token(&self) -> Option<String> {
        self.admin_token
            .clone()
            .or_else(|| std::env::var("MUNINN_ADMIN_TOKEN").ok())
    }

    pub fn upstream_token(&self) -> Option<String> {
        self.upstream_token
            .clone()
            .or_else(|| std::env::var("MUNINN_UPSTREAM_TOKEN").ok())
    }

    pub fn purge_secret(&self) -> Option<String> {
        self.purge_secret
            .clone()
            .or_else(|| std::env::var("MUNINN_PURGE_SECRET").ok())
    }
}

/// Reject secrets readable by group or others.
#[cfg(unix)]
fn ensure_private(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)
        .map_err(|e| MuninnError::Configuration(format!("cannot stat {}: {e}", path.display())))?
        .permissions()
        .mode();
    if mode & 0o077 != 0 {
        return Err(MuninnError::Configuration(format!(
            "{} is mode {:o}; secrets must be 0600 or 0400",
            path.display(),
            mode & 0o777
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_private(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.address, "127.0.0.1:9742");
        assert!(config.server.refresh_loop);
        assert!(config.sources.remote_url.is_none());
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [server]
            address = "0.0.0.0:9742"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:9742");
        assert!(config.server.refresh_loop);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            address = "127.0.0.1:9742"
            refresh_loop = false

            [sources]
            remote_url = "https://example.org/events.json"
            remote_timeout_secs = 5
            store_file = "/var/lib/muninn/store.json"
            fallback_file = "/var/lib/muninn/events.json"

            [invalidation]
            webhook_url = "https://example.org/api/revalidate"

            [cache]
            cache_duration_secs = 120
            max_memory_mb = 16
            always_purge_on_refresh = false
            invalidation_paths = ["/", "/calendar"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.server.refresh_loop);
        assert_eq!(config.sources.remote_timeout_secs, Some(5));
        assert_eq!(
            config.sources.fallback_file,
            Some(PathBuf::from("/var/lib/muninn/events.json"))
        );
        assert_eq!(
            config.invalidation.webhook_url.as_deref(),
            Some("https://example.org/api/revalidate")
        );

        let cache = config.cache.apply(CacheConfig::default());
        assert_eq!(cache.cache_duration, Duration::from_secs(120));
        assert_eq!(cache.max_memory_usage, 16 * 1024 * 1024);
        assert!(!cache.always_purge_on_refresh);
        assert_eq!(cache.invalidation_paths, vec!["/", "/calendar"]);
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            admin_token = "adm"
            purge_secret = "purge"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.admin_token.as_deref(), Some("adm"));
        assert_eq!(secrets.purge_secret.as_deref(), Some("purge"));
        assert!(secrets.upstream_token.is_none());
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("config file not found"));
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_secrets_are_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "admin_token = \"adm\"\n").unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(ensure_private(&path).is_err());

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        ensure_private(&path).unwrap();
        let secrets: Secrets = read_toml(&path, "secrets").unwrap();
        assert_eq!(secrets.admin_token.as_deref(), Some("adm"));
    }
}
