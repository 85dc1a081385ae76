//! Application configuration.
//!
//! A flat structure loaded with the `config` crate (defaults, then an
//! optional file, then environment variables prefixed `CURATOR_`), mirroring
//! the layered-source pattern the rest of this corpus uses `config` for.
//! Recognised options match §6 of the specification exactly: `port`,
//! `log_level`, `encryption_key`, one connection string/host+port per
//! backend, and the image storage path.

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Primary store connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryStoreConfig {
    #[serde(default = "default_db_path")]
    pub database_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "curator.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for PrimaryStoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Text index (tantivy) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TextIndexConfig {
    #[serde(default = "default_ti_path")]
    pub index_path: String,
}

fn default_ti_path() -> String {
    "ti_index".to_string()
}

impl Default for TextIndexConfig {
    fn default() -> Self {
        Self {
            index_path: default_ti_path(),
        }
    }
}

/// Vector index (Qdrant) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorIndexConfig {
    #[serde(default = "default_vi_host")]
    pub host: String,
    #[serde(default = "default_vi_port")]
    pub port: u16,
    #[serde(default = "default_vi_collection")]
    pub collection: String,
}

fn default_vi_host() -> String {
    "http://localhost".to_string()
}

fn default_vi_port() -> u16 {
    6334
}

fn default_vi_collection() -> String {
    "images".to_string()
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            host: default_vi_host(),
            port: default_vi_port(),
            collection: default_vi_collection(),
        }
    }
}

/// Hierarchy cache (Redis) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_host")]
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
}

fn default_cache_host() -> String {
    "127.0.0.1".to_string()
}

fn default_cache_port() -> u16 {
    6379
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_cache_host(),
            port: default_cache_port(),
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub path_style: bool,
}

/// Embedding service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingServiceConfig {
    #[serde(default = "default_embedding_host")]
    pub host: String,
    #[serde(default = "default_embedding_port")]
    pub port: u16,
}

fn default_embedding_host() -> String {
    "127.0.0.1".to_string()
}

fn default_embedding_port() -> u16 {
    9090
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            host: default_embedding_host(),
            port: default_embedding_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub encryption_key: String,
    #[serde(default)]
    pub primary_store: PrimaryStoreConfig,
    #[serde(default)]
    pub text_index: TextIndexConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub embedding_service: EmbeddingServiceConfig,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_path() -> String {
    "images".to_string()
}

impl AppConfig {
    /// Load configuration layering defaults, an optional file, then
    /// environment variables prefixed `CURATOR_` (e.g. `CURATOR_PORT`).
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("port", 8080)?
            .set_default("log_level", "info")?
            .set_default("storage_path", "images")?;

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CURATOR")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder.build()?;
        let app_config: AppConfig = raw.try_deserialize()?;

        if app_config.encryption_key.is_empty() {
            return Err(ConfigError::Invalid(
                "encryption_key must be set".to_string(),
            ));
        }

        Ok(app_config)
    }

    pub fn encryption_key_secret(&self) -> SecretString {
        SecretString::new(self.encryption_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn rejects_missing_encryption_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("CURATOR_ENCRYPTION_KEY");
        let err = AppConfig::load(None);
        assert!(err.is_err());
    }

    #[test]
    fn defaults_apply_when_file_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CURATOR_ENCRYPTION_KEY", "test-key-0123456789012345678901");
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        std::env::remove_var("CURATOR_ENCRYPTION_KEY");
    }
}
