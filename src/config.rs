// src/config.rs
//! Environment-aware configuration loaded from `config.yaml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub llm: LlmSection,
    pub linkedin: LinkedinSection,
    pub session: SessionSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkedinSection {
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Transcript turns replayed to the model on each chat request.
    pub history_window: usize,
    pub max_upload_bytes: u64,
    /// Sessions untouched for this long are discarded by the server.
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub file: Option<PathBuf>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash-latest".to_string(),
            timeout_seconds: 120,
        }
    }
}

impl Default for LinkedinSection {
    fn default() -> Self {
        Self {
            base_url: "https://www.linkedin.com".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            history_window: 40,
            max_upload_bytes: 10 * 1024 * 1024,
            idle_timeout_seconds: 3600,
        }
    }
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file was missing; built-in defaults were used
    Defaults(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "loaded from {}", path.display()),
            Self::Defaults(path) => write!(
                f,
                "{} not found, falling back to built-in defaults",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    local: AppConfig,
    #[serde(default)]
    production: AppConfig,
}

impl AppConfig {
    /// Load `config.yaml` from the working directory for the active environment,
    /// then apply environment variable overrides.
    ///
    /// Runs before logging is set up, so the source is returned for the caller to log.
    pub fn load() -> Result<(Self, ConfigSource)> {
        let environment = Self::get_environment();
        let (mut config, source) = Self::load_from_file(Path::new(CONFIG_FILE), &environment)?;
        config.apply_env_overrides();
        Ok((config, source))
    }

    pub fn get_environment() -> String {
        std::env::var("INTERVIEW_PREP_ENV")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .or_else(|_| std::env::var("ENV"))
            .unwrap_or_else(|_| "local".to_string())
    }

    pub fn load_from_file(path: &Path, environment: &str) -> Result<(Self, ConfigSource)> {
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config = Self::from_yaml(&content, environment)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    pub fn from_yaml(content: &str, environment: &str) -> Result<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(content)?;

        Ok(match environment {
            "production" => config_file.production,
            _ => config_file.local,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("ROCKET_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(url) = std::env::var("GEMINI_API_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("LINKEDIN_BASE_URL") {
            self.linkedin.base_url = url;
        }
    }
}
