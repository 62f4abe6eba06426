//! Configuration management for Momentwall services

use config::ConfigError;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which broadcast backend the relay fans out through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastBackend {
    Local,
    Nats,
}

/// Broadcast channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    pub backend: BroadcastBackend,
    pub room_capacity: usize,
    pub message_bus_url: String,
    pub subject_prefix: String,
}

/// Upload pipeline configuration shared by client and relay
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub timeout_secs: u64,
    pub caption_timeout_secs: u64,
    pub default_caption: String,
    pub guest_max_upload_mb: f64,
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn caption_timeout(&self) -> Duration {
        Duration::from_secs(self.caption_timeout_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            caption_timeout_secs: 10,
            default_caption: "A moment from the event".to_string(),
            guest_max_upload_mb: 50.0,
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: Option<String>,
}

/// Relay server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub public_url: String,
    pub media_dir: PathBuf,
    /// JSON file with accounts and events to load at startup
    pub directory_seed: Option<PathBuf>,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub relay: RelayConfig,
    pub upload: UploadConfig,
    pub broadcast: BroadcastConfig,
    pub object_storage: Option<ObjectStorageConfig>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let upload_defaults = UploadConfig::default();

        let backend = match lookup("BROADCAST_BACKEND").as_deref() {
            None | Some("local") => BroadcastBackend::Local,
            Some("nats") => BroadcastBackend::Nats,
            Some(other) => {
                return Err(ConfigError::Message(format!(
                    "BROADCAST_BACKEND must be 'local' or 'nats', got '{}'",
                    other
                )))
            }
        };

        // Build object storage config if all required vars are present
        let object_storage = if let (Some(endpoint), Some(access_key), Some(secret_key), Some(bucket)) = (
            lookup("OBJECT_STORAGE_ENDPOINT"),
            lookup("OBJECT_STORAGE_ACCESS_KEY"),
            lookup("OBJECT_STORAGE_SECRET_KEY"),
            lookup("OBJECT_STORAGE_BUCKET"),
        ) {
            Some(ObjectStorageConfig {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region: lookup("OBJECT_STORAGE_REGION"),
            })
        } else {
            None
        };

        Ok(Self {
            relay: RelayConfig {
                bind_addr: lookup("RELAY_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
                public_url: lookup("RELAY_PUBLIC_URL")
                    .unwrap_or_else(|| "http://localhost:8080".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                media_dir: lookup("MEDIA_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./media")),
                directory_seed: lookup("RELAY_DIRECTORY_FILE").map(PathBuf::from),
            },
            upload: UploadConfig {
                timeout_secs: parse_or(&lookup, "UPLOAD_TIMEOUT_SECS", upload_defaults.timeout_secs)?,
                caption_timeout_secs: parse_or(
                    &lookup,
                    "CAPTION_TIMEOUT_SECS",
                    upload_defaults.caption_timeout_secs,
                )?,
                default_caption: lookup("DEFAULT_CAPTION").unwrap_or(upload_defaults.default_caption),
                guest_max_upload_mb: parse_or(
                    &lookup,
                    "GUEST_MAX_UPLOAD_MB",
                    upload_defaults.guest_max_upload_mb,
                )?,
            },
            broadcast: BroadcastConfig {
                backend,
                room_capacity: parse_or(&lookup, "ROOM_CAPACITY", 256)?,
                message_bus_url: lookup("MESSAGE_BUS_URL")
                    .unwrap_or_else(|| "nats://localhost:4222".to_string()),
                subject_prefix: lookup("MESSAGE_BUS_SUBJECT_PREFIX")
                    .unwrap_or_else(|| "momentwall".to_string()),
            },
            object_storage,
            log_level: Some(lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string())),
            log_format: lookup("LOG_FORMAT"),
        })
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Message(format!("{} has an invalid value: '{}'", key, raw))),
    }
}
