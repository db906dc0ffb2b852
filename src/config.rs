use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GmailError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Port for the local authorization callback listener (0 picks a free port)
    #[serde(default)]
    pub oauth2_port: u16,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            credentials_path: default_credentials_path(),
            scopes: default_scopes(),
            oauth2_port: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub include_spam_trash: bool,
    #[serde(default = "default_paginate_messages")]
    pub paginate_messages: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub batch_mode: BatchMode,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            batch_size: default_batch_size(),
            include_spam_trash: false,
            paginate_messages: default_paginate_messages(),
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            batch_mode: BatchMode::default(),
        }
    }
}

/// How message records are grouped into output files
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// Every file holds all records accumulated so far, and the loop stops
    /// once the next window end reaches the message count, so the tail
    /// after the last written window is never exported.
    #[default]
    Legacy,
    /// Every file holds exactly its own window; the short tail is flushed.
    Windowed,
}

impl std::fmt::Display for BatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchMode::Legacy => write!(f, "legacy"),
            BatchMode::Windowed => write!(f, "windowed"),
        }
    }
}

fn default_token_path() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_scopes() -> Vec<String> {
    crate::auth::READONLY_SCOPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_label() -> String {
    "Gaby".to_string()
}

fn default_batch_size() -> usize {
    200
}

fn default_paginate_messages() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_prefix() -> String {
    "gaby-email-part".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.auth.scopes.is_empty() {
            return Err(GmailError::ConfigError(
                "auth.scopes must contain at least one scope".to_string(),
            ));
        }
        if self.auth.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(GmailError::ConfigError(
                "auth.scopes cannot contain empty strings".to_string(),
            ));
        }

        if self.export.label.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "export.label cannot be empty".to_string(),
            ));
        }

        if self.export.batch_size == 0 {
            return Err(GmailError::ConfigError(
                "export.batch_size must be at least 1".to_string(),
            ));
        }

        if self.export.file_prefix.is_empty() {
            return Err(GmailError::ConfigError(
                "export.file_prefix cannot be empty".to_string(),
            ));
        }
        if self.export.file_prefix.contains('/') || self.export.file_prefix.contains('\\') {
            return Err(GmailError::ConfigError(
                "export.file_prefix cannot contain path separators".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.auth.token_path, PathBuf::from("token.json"));
        assert_eq!(config.auth.credentials_path, PathBuf::from("credentials.json"));
        assert_eq!(
            config.auth.scopes,
            vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()]
        );
        assert_eq!(config.auth.oauth2_port, 0);

        assert_eq!(config.export.label, "Gaby");
        assert_eq!(config.export.batch_size, 200);
        assert!(!config.export.include_spam_trash);
        assert!(config.export.paginate_messages);
        assert_eq!(config.export.output_dir, PathBuf::from("."));
        assert_eq!(config.export.file_prefix, "gaby-email-part");
        assert_eq!(config.export.batch_mode, BatchMode::Legacy);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_batch_size_zero() {
        let mut config = Config::default();
        config.export.batch_size = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[test]
    fn test_config_validation_empty_label() {
        let mut config = Config::default();
        config.export.label = "  ".to_string();
        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("export.label cannot be empty"));
    }

    #[test]
    fn test_config_validation_empty_scopes() {
        let mut config = Config::default();
        config.auth.scopes.clear();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("at least one scope"));

        config.auth.scopes = vec!["".to_string()];
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("cannot contain empty strings"));
    }

    #[test]
    fn test_config_validation_file_prefix() {
        let mut config = Config::default();
        config.export.file_prefix = String::new();
        assert!(config.validate().is_err());

        config.export.file_prefix = "out/part".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("path separators"));
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.export.label = "Receipts".to_string();
        config.export.batch_mode = BatchMode::Windowed;
        config.auth.oauth2_port = 8085;
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.export.label, "Receipts");
        assert_eq!(loaded.export.batch_mode, BatchMode::Windowed);
        assert_eq!(loaded.auth.oauth2_port, 8085);
        assert_eq!(loaded.export.batch_size, 200);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.export.label, "Gaby");
        assert_eq!(config.export.batch_size, 200);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let partial_config = r#"
[export]
label = "Newsletters"
batch_mode = "windowed"
"#;
        tokio::fs::write(temp_file.path(), partial_config).await.unwrap();

        let config = Config::load(temp_file.path()).await.unwrap();

        assert_eq!(config.export.label, "Newsletters");
        assert_eq!(config.export.batch_mode, BatchMode::Windowed);
        assert_eq!(config.export.batch_size, 200);
        assert_eq!(config.export.file_prefix, "gaby-email-part");
        assert_eq!(config.auth.token_path, PathBuf::from("token.json"));
    }

    #[tokio::test]
    async fn test_config_rejects_unknown_batch_mode() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "[export]\nbatch_mode = \"sliding\"\n")
            .await
            .unwrap();

        assert!(Config::load(temp_file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_example(&path).await.unwrap();
        assert!(path.exists());

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.export.batch_size, 200);
    }
}
