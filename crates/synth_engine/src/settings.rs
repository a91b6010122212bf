use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use synth_logging::synth_info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Backend paths, relative to `ClientSettings::base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub ingest_batch: String,
    /// `GET {batch_status}/{batch_id}`
    pub batch_status: String,
    /// `POST {batch_cancel}/{batch_id}`
    pub batch_cancel: String,
    /// `POST {batch_retry}/{batch_id}`
    pub batch_retry: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            ingest_batch: "/api/v1/ingest/batch".to_string(),
            batch_status: "/api/v1/ingest/batch/status".to_string(),
            batch_cancel: "/api/v1/ingest/batch/cancel".to_string(),
            batch_retry: "/api/v1/ingest/batch/retry".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub base_url: String,
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Applies to status, cancel and retry calls.
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    /// Applies to batch uploads. Streams have no timeout.
    #[serde(with = "millis")]
    pub upload_timeout: Duration,
    pub endpoints: Endpoints,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(600),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientSettings {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
    }
}

/// Loads settings from a RON file. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<ClientSettings, SettingsError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            synth_info!("No settings at {:?}, using defaults", path);
            return Ok(ClientSettings::default());
        }
        Err(err) => return Err(err.into()),
    };
    let settings = ClientSettings::from_ron_str(&content)?;
    synth_info!("Loaded client settings from {:?}", path);
    Ok(settings)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
