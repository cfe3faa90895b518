use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ddlsynth_ai::{CompletionClient, HttpClientConfig, HttpCompletionClient};
use ddlsynth_jobs::JobSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runs::write_bytes_atomic;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Decode(#[from] toml::de::Error),
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("completion client error: {0}")]
    Client(#[from] ddlsynth_ai::CompletionError),
}

pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key; the key itself is never stored.
    pub api_key_env: String,
    pub table_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "DDLSYNTH_API_KEY".to_string(),
            table_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobLimits {
    pub max_concurrent_jobs: usize,
    pub retention_secs: u64,
}

impl Default for JobLimits {
    fn default() -> Self {
        let defaults = JobSettings::default();
        Self {
            max_concurrent_jobs: defaults.max_concurrent_jobs,
            retention_secs: defaults.retention.as_secs(),
        }
    }
}

/// Contents of `ddlsynth.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub llm: LlmSettings,
    pub jobs: JobLimits,
}

impl ServiceSettings {
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            max_concurrent_jobs: self.jobs.max_concurrent_jobs,
            retention: Duration::from_secs(self.jobs.retention_secs),
        }
    }

    pub fn table_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.table_timeout_secs)
    }

    /// HTTP completion client when the service is enabled here or by `force`.
    pub fn completion_client(&self, force: bool) -> SettingsResult<Option<Arc<dyn CompletionClient>>> {
        if !(self.llm.enabled || force) {
            return Ok(None);
        }
        let api_key = std::env::var(&self.llm.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(env = %self.llm.api_key_env, "completion api key not set");
        }
        let client = HttpCompletionClient::new(HttpClientConfig {
            endpoint: self.llm.endpoint.clone(),
            model: self.llm.model.clone(),
            api_key,
            request_timeout: self.table_timeout(),
        })?;
        tracing::info!(model = %client.model(), "completion service enabled");
        let client: Arc<dyn CompletionClient> = Arc::new(client);
        Ok(Some(client))
    }
}

pub fn load_or_create_settings(path: &Path) -> SettingsResult<ServiceSettings> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let settings: ServiceSettings = toml::from_str(&content)?;
        return Ok(settings);
    }

    let settings = ServiceSettings::default();
    save_settings(path, &settings)?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &ServiceSettings) -> SettingsResult<()> {
    let encoded = toml::to_string_pretty(settings)?;
    write_bytes_atomic(path, encoded.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("ddlsynth-settings-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let path = scratch_path("ddlsynth.toml");
        let settings = load_or_create_settings(&path).expect("settings");

        assert_eq!(settings, ServiceSettings::default());
        assert!(path.exists());
        assert_eq!(load_or_create_settings(&path).expect("reload"), settings);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: ServiceSettings =
            toml::from_str("[jobs]\nmax_concurrent_jobs = 2\n").expect("toml");
        assert_eq!(settings.jobs.max_concurrent_jobs, 2);
        assert_eq!(settings.jobs.retention_secs, 3600);
        assert!(!settings.llm.enabled);
        assert_eq!(settings.job_settings().max_concurrent_jobs, 2);
        assert_eq!(settings.table_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn disabled_service_builds_no_client() {
        let settings = ServiceSettings::default();
        assert!(settings.completion_client(false).expect("client").is_none());
    }
}
