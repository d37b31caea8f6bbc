//! On-disk configuration for Footprint clients.
//!
//! A TOML file overlaid with `FOOTPRINT_` environment variables, translated
//! into a `footprint_core::ClientConfig`. Nested keys use `__` in the
//! environment, e.g. `FOOTPRINT_RETRY__MAX_ELAPSED_SECS=300`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use footprint_api::{Credentials, MAX_TARGETS_PER_REQUEST, ScanSurfaceBatcher, TransportConfig};
use footprint_core::{CacheConfig, ClientConfig, RetryPolicy};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FOOTPRINT_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {0} configured")]
    Missing(&'static str),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Secrets ─────────────────────────────────────────────────────────

fn read_secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

fn write_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

// ── TOML config structs ─────────────────────────────────────────────

/// How to authenticate against the service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Session login with username and password.
    Password {
        username: String,
        #[serde(deserialize_with = "read_secret", serialize_with = "write_secret")]
        password: SecretString,
    },
    /// Static `FootprintApiKey` header.
    ApiKey {
        #[serde(deserialize_with = "read_secret", serialize_with = "write_secret")]
        key: SecretString,
    },
}

impl From<AuthConfig> for Credentials {
    fn from(auth: AuthConfig) -> Self {
        match auth {
            AuthConfig::Password { username, password } => Self::Password { username, password },
            AuthConfig::ApiKey { key } => Self::ApiKey { key },
        }
    }
}

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// API base URL (e.g., "https://footprint.example.com/api/").
    pub api_url: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    pub auth: Option<AuthConfig>,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub batch: BatchSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            auth: None,
            retry: RetrySettings::default(),
            cache: CacheSettings::default(),
            batch: BatchSettings::default(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}
fn default_read_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub backoff_unit_secs: u64,
    pub max_elapsed_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            backoff_unit_secs: 60,
            max_elapsed_secs: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub registrations_ttl_secs: u64,
    pub accounts_ttl_secs: u64,
    pub scanners_ttl_secs: u64,
    pub users_ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            registrations_ttl_secs: 86_400,
            accounts_ttl_secs: 86_400,
            scanners_ttl_secs: 3_600,
            users_ttl_secs: 3_600,
            max_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchSettings {
    pub max_batch_size: usize,
    pub deduplicate: bool,
    pub exclude_private: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_TARGETS_PER_REQUEST,
            deduplicate: true,
            exclude_private: true,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "footprint", "footprint").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("footprint");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading & saving ────────────────────────────────────────────────

impl Config {
    /// Defaults, then the TOML file at `path` (if any), then the environment.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load from the canonical config path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::figment(path).extract()?)
    }

    /// Serialize to TOML and write to the canonical config path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    // ── Translation ─────────────────────────────────────────────────

    /// Validate and build the runtime client configuration.
    pub fn into_client_config(self) -> Result<ClientConfig, ConfigError> {
        let raw_url = self.api_url.ok_or(ConfigError::Missing("api_url"))?;
        let base_url: url::Url = raw_url
            .parse()
            .map_err(|e| invalid("api_url", format!("{raw_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid("api_url", format!("unsupported scheme in {raw_url}")));
        }

        let credentials: Credentials = self.auth.ok_or(ConfigError::Missing("auth"))?.into();

        if self.retry.backoff_unit_secs == 0 {
            return Err(invalid("retry.backoff_unit_secs", "must be positive"));
        }
        let batch = &self.batch;
        if !(1..=MAX_TARGETS_PER_REQUEST).contains(&batch.max_batch_size) {
            return Err(invalid(
                "batch.max_batch_size",
                format!("must be between 1 and {MAX_TARGETS_PER_REQUEST}"),
            ));
        }

        let cache = &self.cache;
        Ok(ClientConfig {
            base_url,
            credentials,
            transport: TransportConfig {
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                read_timeout: Duration::from_secs(self.read_timeout_secs),
            },
            retry: RetryPolicy {
                backoff_unit: Duration::from_secs(self.retry.backoff_unit_secs),
                max_elapsed: Duration::from_secs(self.retry.max_elapsed_secs),
            },
            cache: CacheConfig {
                registrations_ttl: Duration::from_secs(cache.registrations_ttl_secs),
                accounts_ttl: Duration::from_secs(cache.accounts_ttl_secs),
                scanners_ttl: Duration::from_secs(cache.scanners_ttl_secs),
                users_ttl: Duration::from_secs(cache.users_ttl_secs),
                max_capacity: cache.max_capacity,
            },
            batcher: ScanSurfaceBatcher::new(batch.max_batch_size)
                .with_deduplicate(batch.deduplicate)
                .with_exclude_private(batch.exclude_private),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.read_timeout_secs, 120);
        assert_eq!(config.retry, RetrySettings::default());
        assert_eq!(config.batch.max_batch_size, 1024);
        assert!(matches!(
            config.into_client_config(),
            Err(ConfigError::Missing("api_url"))
        ));
    }

    #[test]
    fn password_profile_builds_client_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
api_url = "https://footprint.example.com/api/"

[auth]
method = "password"
username = "analyst"
password = "hunter2"

[retry]
backoff_unit_secs = 5

[cache]
scanners_ttl_secs = 60

[batch]
max_batch_size = 256
exclude_private = false
"#,
        );

        let client = Config::load_from(&path)
            .unwrap()
            .into_client_config()
            .unwrap();

        assert_eq!(client.base_url.host_str(), Some("footprint.example.com"));
        assert!(matches!(
            &client.credentials,
            Credentials::Password { username, password }
                if username == "analyst" && password.expose_secret() == "hunter2"
        ));
        assert_eq!(client.retry.backoff_unit, Duration::from_secs(5));
        assert_eq!(client.retry.max_elapsed, Duration::from_secs(180));
        assert_eq!(client.cache.scanners_ttl, Duration::from_secs(60));
        assert_eq!(client.cache.accounts_ttl, Duration::from_secs(86_400));
        assert_eq!(client.batcher.max_batch_size(), 256);
        assert!(client.batcher.deduplicates());
        assert!(!client.batcher.excludes_private());
    }

    #[test]
    fn api_key_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
api_url = "https://footprint.example.com/api/"
auth = { method = "api_key", key = "k-123" }
"#,
        );

        let client = Config::load_from(&path)
            .unwrap()
            .into_client_config()
            .unwrap();
        assert!(matches!(
            &client.credentials,
            Credentials::ApiKey { key } if key.expose_secret() == "k-123"
        ));
    }

    #[test]
    fn rejects_oversized_batches() {
        let config = Config {
            api_url: Some("https://footprint.example.com/".into()),
            auth: Some(AuthConfig::ApiKey {
                key: SecretString::from("k".to_owned()),
            }),
            batch: BatchSettings {
                max_batch_size: 4096,
                ..BatchSettings::default()
            },
            ..Config::default()
        };

        let err = config.into_client_config().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation { ref field, .. } if field == "batch.max_batch_size"
        ));
    }

    #[test]
    fn rejects_bad_url() {
        let config = Config {
            api_url: Some("not a url".into()),
            auth: Some(AuthConfig::ApiKey {
                key: SecretString::from("k".to_owned()),
            }),
            ..Config::default()
        };
        assert!(matches!(
            config.into_client_config(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            api_url: Some("https://footprint.example.com/api/".into()),
            auth: Some(AuthConfig::Password {
                username: "analyst".into(),
                password: SecretString::from("hunter2".to_owned()),
            }),
            read_timeout_secs: 45,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("method = \"password\""));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.read_timeout_secs, 45);
        assert_eq!(loaded.api_url, config.api_url);
        assert!(matches!(
            loaded.auth,
            Some(AuthConfig::Password { ref password, .. }) if password.expose_secret() == "hunter2"
        ));
    }
}
