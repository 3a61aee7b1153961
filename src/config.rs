use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ai::AiError;

pub const CONFIG_FILE_NAME: &str = "wukan_ai_config.json";
pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const OPENAI_COMPATIBLE_DEFAULT_MODEL: &str = "qwen-plus";
pub const API_KEY_ENV: &str = "WUKAN_API_KEY";

/// Non-empty key from [`API_KEY_ENV`], if set.
pub fn env_api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AIConfig {
    pub provider: ServiceProvider,
    pub api_key: String,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceProvider {
    /// Google Gemini through its chat-session streaming API.
    Gemini,
    /// Alibaba Cloud Bailian (DashScope OpenAI-compatible mode).
    Bailian,
    /// Any user-supplied OpenAI-compatible endpoint.
    Custom,
}

impl ServiceProvider {
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceProvider::Gemini => "Google Gemini",
            ServiceProvider::Bailian => "阿里云百炼",
            ServiceProvider::Custom => "其他 (OpenAI)",
        }
    }

    /// Providers spoken to over raw HTTP with server-sent events.
    pub fn uses_sse(&self) -> bool {
        matches!(self, ServiceProvider::Bailian | ServiceProvider::Custom)
    }

    pub fn all() -> Vec<ServiceProvider> {
        vec![
            ServiceProvider::Bailian,
            ServiceProvider::Gemini,
            ServiceProvider::Custom,
        ]
    }
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            provider: ServiceProvider::Bailian,
            api_key: String::new(),
            model_name: "qwen3-max".to_string(),
            base_url: Some(DASHSCOPE_BASE_URL.to_string()),
        }
    }
}

impl AIConfig {
    /// Switch provider the way the settings dialog does: Bailian snaps back to the
    /// DashScope endpoint, Gemini picks its default model, Custom keeps what is there.
    pub fn select_provider(&mut self, provider: ServiceProvider) {
        self.provider = provider;
        match provider {
            ServiceProvider::Bailian => {
                self.base_url = Some(DASHSCOPE_BASE_URL.to_string());
                self.model_name = OPENAI_COMPATIBLE_DEFAULT_MODEL.to_string();
            }
            ServiceProvider::Gemini => {
                self.model_name = GEMINI_DEFAULT_MODEL.to_string();
            }
            ServiceProvider::Custom => {}
        }
    }

    pub fn effective_model(&self) -> &str {
        if !self.model_name.trim().is_empty() {
            return &self.model_name;
        }
        match self.provider {
            ServiceProvider::Gemini => GEMINI_DEFAULT_MODEL,
            ServiceProvider::Bailian | ServiceProvider::Custom => OPENAI_COMPATIBLE_DEFAULT_MODEL,
        }
    }

    /// Base URL with blanks treated as absent.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Must pass before any network call is attempted.
    pub fn validate(&self) -> Result<(), AiError> {
        if self.api_key.trim().is_empty() {
            return Err(AiError::Configuration(format!(
                "API key is required for {}. Open settings to add your key.",
                self.provider.display_name()
            )));
        }
        if self.provider.uses_sse() && self.base_url().is_none() {
            return Err(AiError::Configuration(format!(
                "Base URL is required for {}.",
                self.provider.display_name()
            )));
        }
        Ok(())
    }

    /// Settings in effect: the stored blob with [`API_KEY_ENV`] taking over the
    /// key when set. Not meant to be saved back; use [`AIConfig::update_stored`].
    pub fn load(dir: &Path) -> Self {
        let mut config = Self::load_stored(dir);
        if let Some(key) = env_api_key() {
            config.api_key = key;
        }
        config
    }

    /// Read the settings blob from `dir`. A missing file is created with defaults,
    /// an unreadable or corrupt one falls back to defaults.
    pub fn load_stored(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    log::warn!("Ignoring corrupt settings at {}: {}", config_path.display(), e);
                    Self::default()
                }),
                Err(_) => Self::default(),
            }
        } else {
            let c = Self::default();
            if let Err(e) = c.save(dir) {
                log::warn!("Could not write default settings: {:#}", e);
            }
            c
        }
    }

    /// Apply `change` to the stored settings and write them back. Environment
    /// overrides are neither applied nor persisted.
    pub fn update_stored<F>(dir: &Path, change: F) -> anyhow::Result<Self>
    where
        F: FnOnce(&mut AIConfig),
    {
        let mut stored = Self::load_stored(dir);
        change(&mut stored);
        stored.save(dir)?;
        Ok(stored)
    }

    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create settings dir {}", dir.display()))?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        let content = serde_json::to_string_pretty(self).context("Failed to encode settings")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(())
    }
}

/// Platform settings directory, e.g. `~/.config/wukan-ai` on Linux.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wukan-ai")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(provider: ServiceProvider) -> AIConfig {
        AIConfig {
            provider,
            api_key: "sk-test".to_string(),
            model_name: String::new(),
            base_url: None,
        }
    }

    #[test]
    fn default_targets_dashscope() {
        let cfg = AIConfig::default();
        assert_eq!(cfg.provider, ServiceProvider::Bailian);
        assert_eq!(cfg.model_name, "qwen3-max");
        assert_eq!(cfg.base_url(), Some(DASHSCOPE_BASE_URL));
        assert!(cfg.api_key.is_empty());
    }

    #[test]
    fn serializes_like_the_settings_blob() {
        let json = serde_json::to_value(AIConfig::default()).unwrap();
        assert_eq!(json["provider"], "BAILIAN");
        assert_eq!(json["modelName"], "qwen3-max");
        assert_eq!(json["baseUrl"], DASHSCOPE_BASE_URL);
        assert_eq!(json["apiKey"], "");

        let parsed: AIConfig = serde_json::from_str(
            r#"{"provider":"GEMINI","apiKey":"k","modelName":"gemini-2.5-pro"}"#,
        )
        .unwrap();
        assert_eq!(parsed.provider, ServiceProvider::Gemini);
        assert_eq!(parsed.base_url, None);
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let mut cfg = AIConfig::default();
        cfg.api_key = "   ".to_string();
        assert!(matches!(cfg.validate(), Err(AiError::Configuration(_))));
    }

    #[test]
    fn sse_providers_need_a_base_url() {
        let mut cfg = configured(ServiceProvider::Custom);
        assert!(matches!(cfg.validate(), Err(AiError::Configuration(_))));
        cfg.base_url = Some("  ".to_string());
        assert!(matches!(cfg.validate(), Err(AiError::Configuration(_))));
        cfg.base_url = Some("https://example.com/v1".to_string());
        assert!(cfg.validate().is_ok());

        assert!(configured(ServiceProvider::Gemini).validate().is_ok());
    }

    #[test]
    fn provider_presets() {
        let mut cfg = configured(ServiceProvider::Custom);
        cfg.base_url = Some("https://example.com/v1".to_string());
        cfg.model_name = "my-model".to_string();

        cfg.select_provider(ServiceProvider::Custom);
        assert_eq!(cfg.model_name, "my-model");

        cfg.select_provider(ServiceProvider::Gemini);
        assert_eq!(cfg.model_name, GEMINI_DEFAULT_MODEL);
        assert_eq!(cfg.base_url(), Some("https://example.com/v1"));

        cfg.select_provider(ServiceProvider::Bailian);
        assert_eq!(cfg.model_name, OPENAI_COMPATIBLE_DEFAULT_MODEL);
        assert_eq!(cfg.base_url(), Some(DASHSCOPE_BASE_URL));
    }

    #[test]
    fn empty_model_falls_back_per_provider() {
        assert_eq!(
            configured(ServiceProvider::Gemini).effective_model(),
            GEMINI_DEFAULT_MODEL
        );
        assert_eq!(
            configured(ServiceProvider::Bailian).effective_model(),
            OPENAI_COMPATIBLE_DEFAULT_MODEL
        );
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = configured(ServiceProvider::Gemini);
        cfg.model_name = "gemini-2.5-pro".to_string();
        cfg.save(dir.path()).unwrap();

        let loaded = AIConfig::load(dir.path());
        assert_eq!(loaded.provider, ServiceProvider::Gemini);
        assert_eq!(loaded.model_name, "gemini-2.5-pro");
    }

    #[test]
    fn corrupt_settings_fall_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{not json").unwrap();
        let loaded = AIConfig::load(dir.path());
        assert_eq!(loaded.provider, ServiceProvider::Bailian);
        assert_eq!(loaded.model_name, "qwen3-max");
    }

    #[test]
    fn env_key_is_applied_but_never_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = configured(ServiceProvider::Bailian);
        cfg.api_key = "disk-key".to_string();
        cfg.save(dir.path()).unwrap();

        std::env::set_var(API_KEY_ENV, "env-secret");
        let effective = AIConfig::load(dir.path());
        let updated = AIConfig::update_stored(dir.path(), |c| {
            c.model_name = "qwen-max".to_string();
        });
        std::env::remove_var(API_KEY_ENV);

        assert_eq!(effective.api_key, "env-secret");
        let updated = updated.unwrap();
        assert_eq!(updated.api_key, "disk-key");

        let on_disk = std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(!on_disk.contains("env-secret"));
        let reloaded = AIConfig::load_stored(dir.path());
        assert_eq!(reloaded.api_key, "disk-key");
        assert_eq!(reloaded.model_name, "qwen-max");
    }

    #[test]
    fn missing_settings_are_written_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("fresh");
        AIConfig::load(&nested);
        assert!(nested.join(CONFIG_FILE_NAME).exists());
    }
}
