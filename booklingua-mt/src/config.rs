//! Provider presets and pipeline settings
//!
//! Configuration is resolved once, before any phase runs: a preset supplies
//! the endpoint and default model, command-line overrides win over the
//! preset, and API keys fall back to the preset's environment variable.

use crate::context::{DEFAULT_CONTEXT_SIZE, DEFAULT_PREFILL_SIZE};
use crate::error::{MtError, MtResult};
use crate::throttle::RetryPolicy;
use booklingua::ChapterSelection;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 2000;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Known chat-completions endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    OpenAi,
    #[default]
    Ollama,
    Mistral,
    DeepSeek,
    LmStudio,
    Together,
    OpenRouter,
}

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::OpenAi,
        Preset::Ollama,
        Preset::Mistral,
        Preset::DeepSeek,
        Preset::LmStudio,
        Preset::Together,
        Preset::OpenRouter,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::OpenAi => "openai",
            Preset::Ollama => "ollama",
            Preset::Mistral => "mistral",
            Preset::DeepSeek => "deepseek",
            Preset::LmStudio => "lmstudio",
            Preset::Together => "together",
            Preset::OpenRouter => "openrouter",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Preset::OpenAi => "https://api.openai.com/v1",
            Preset::Ollama => "http://localhost:11434/v1",
            Preset::Mistral => "https://api.mistral.ai/v1",
            Preset::DeepSeek => "https://api.deepseek.com/v1",
            Preset::LmStudio => "http://localhost:1234/v1",
            Preset::Together => "https://api.together.xyz/v1",
            Preset::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Preset::OpenAi => "gpt-4o",
            Preset::Ollama => "gemma3n:e4b",
            Preset::Mistral => "mistral-large-latest",
            Preset::DeepSeek => "deepseek-chat",
            Preset::LmStudio => "qwen2.5-72b",
            Preset::Together => "openai/gpt-oss-20b",
            Preset::OpenRouter => "openai/gpt-4o",
        }
    }

    /// Environment variable holding the API key; `None` for local servers
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Preset::OpenAi => Some("OPENAI_API_KEY"),
            Preset::Mistral => Some("MISTRAL_API_KEY"),
            Preset::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Preset::Together => Some("TOGETHER_API_KEY"),
            Preset::OpenRouter => Some("OPENROUTER_API_KEY"),
            Preset::Ollama | Preset::LmStudio => None,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command-line overrides on top of a preset
#[derive(Debug, Clone, Default)]
pub struct ProviderOverrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

/// Fully resolved connection settings for a chat-completions provider
#[derive(Clone)]
pub struct ProviderConfig {
    pub preset: Preset,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Resolve a preset with overrides, reading keys from the environment
    pub fn resolve(preset: Preset, overrides: ProviderOverrides) -> MtResult<Self> {
        Self::resolve_with_env(preset, overrides, |name| std::env::var(name).ok())
    }

    /// Resolve a preset with overrides and an explicit environment lookup
    ///
    /// # Returns
    /// * `Ok(ProviderConfig)` - Validated settings
    /// * `Err(MtError::Config)` - Missing key for a hosted preset, bad URL,
    ///   or out-of-range parameters
    pub fn resolve_with_env(
        preset: Preset,
        overrides: ProviderOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> MtResult<Self> {
        let custom_url = overrides.base_url.is_some();
        let base_url = overrides
            .base_url
            .unwrap_or_else(|| preset.base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        let api_key = overrides
            .api_key
            .or_else(|| preset.api_key_env().and_then(&env))
            .filter(|key| !key.trim().is_empty());

        let config = Self {
            preset,
            base_url,
            model: overrides
                .model
                .unwrap_or_else(|| preset.default_model().to_string()),
            api_key,
            temperature: overrides.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: overrides.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: overrides.timeout.unwrap_or(DEFAULT_TIMEOUT),
        };

        // A custom endpoint may not need the preset's key
        if let (Some(var), false, None) = (preset.api_key_env(), custom_url, &config.api_key) {
            return Err(MtError::Config(format!(
                "{} requires an API key: pass --api-key or set {}",
                preset, var
            )));
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> MtResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(MtError::Config(format!(
                "base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(MtError::Config("model cannot be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(MtError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(MtError::Config("max tokens must be positive".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("preset", &self.preset)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub source_lang: String,
    pub target_lang: String,
    pub selection: ChapterSelection,
    /// Upper bound on chunk size, in characters
    pub max_chunk_chars: usize,
    /// Context window capacity per chapter
    pub context_size: usize,
    /// Exchanges used to seed a resumed chapter
    pub prefill_size: usize,
    /// Word budget of the context sent with each call
    pub context_word_budget: usize,
    pub throttle: Duration,
    pub retry: RetryPolicy,
    /// Force re-translation, superseding cached entries
    pub new_edition: bool,
    pub lock_timeout: Duration,
}

impl PipelineSettings {
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            selection: ChapterSelection::all(),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            context_size: DEFAULT_CONTEXT_SIZE,
            prefill_size: DEFAULT_PREFILL_SIZE,
            context_word_budget: DEFAULT_MAX_TOKENS as usize / 8,
            throttle: Duration::ZERO,
            retry: RetryPolicy::default(),
            new_edition: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Source and target languages are the same: text is copied, not sent
    pub fn is_copy(&self) -> bool {
        self.source_lang.trim().eq_ignore_ascii_case(self.target_lang.trim())
    }

    pub fn validate(&self) -> MtResult<()> {
        if self.source_lang.trim().is_empty() || self.target_lang.trim().is_empty() {
            return Err(MtError::Config(
                "source and target languages are required".to_string(),
            ));
        }
        if self.max_chunk_chars == 0 {
            return Err(MtError::Config("chunk size must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(MtError::Config("retries must allow at least one attempt".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ========== Preset Tests ==========

    #[test]
    fn test_default_preset_is_ollama() {
        let config =
            ProviderConfig::resolve_with_env(Preset::default(), ProviderOverrides::default(), no_env)
                .unwrap();
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert_eq!(config.model, "gemma3n:e4b");
        assert_eq!(config.api_key, None);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_hosted_preset_reads_env_key() {
        let env = |name: &str| (name == "MISTRAL_API_KEY").then(|| "secret".to_string());
        let config =
            ProviderConfig::resolve_with_env(Preset::Mistral, ProviderOverrides::default(), env)
                .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.model, "mistral-large-latest");
    }

    #[test]
    fn test_hosted_preset_without_key_fails() {
        let err =
            ProviderConfig::resolve_with_env(Preset::DeepSeek, ProviderOverrides::default(), no_env)
                .unwrap_err();
        match err {
            MtError::Config(msg) => assert!(msg.contains("DEEPSEEK_API_KEY")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let env = |_: &str| Some("  ".to_string());
        assert!(
            ProviderConfig::resolve_with_env(Preset::OpenAi, ProviderOverrides::default(), env)
                .is_err()
        );
    }

    #[test]
    fn test_custom_url_does_not_need_preset_key() {
        let overrides = ProviderOverrides {
            base_url: Some("http://gpu-box:8000/v1/".to_string()),
            ..Default::default()
        };
        let config = ProviderConfig::resolve_with_env(Preset::OpenAi, overrides, no_env).unwrap();
        assert_eq!(config.base_url, "http://gpu-box:8000/v1");
    }

    #[test]
    fn test_overrides_win() {
        let overrides = ProviderOverrides {
            model: Some("llama3".to_string()),
            api_key: Some("cli-key".to_string()),
            temperature: Some(0.7),
            max_tokens: Some(1024),
            ..Default::default()
        };
        let env = |_: &str| Some("env-key".to_string());
        let config = ProviderConfig::resolve_with_env(Preset::Together, overrides, env).unwrap();
        assert_eq!(config.model, "llama3");
        assert_eq!(config.api_key.as_deref(), Some("cli-key"));
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 1024);
    }

    // ========== Validation Tests ==========

    #[test]
    fn test_invalid_parameters() {
        let bad_url = ProviderOverrides {
            base_url: Some("localhost:11434".to_string()),
            ..Default::default()
        };
        assert!(ProviderConfig::resolve_with_env(Preset::Ollama, bad_url, no_env).is_err());

        let bad_temperature = ProviderOverrides {
            temperature: Some(3.5),
            ..Default::default()
        };
        assert!(ProviderConfig::resolve_with_env(Preset::Ollama, bad_temperature, no_env).is_err());

        let bad_tokens = ProviderOverrides {
            max_tokens: Some(0),
            ..Default::default()
        };
        assert!(ProviderConfig::resolve_with_env(Preset::Ollama, bad_tokens, no_env).is_err());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let overrides = ProviderOverrides {
            api_key: Some("super-secret".to_string()),
            ..Default::default()
        };
        let config = ProviderConfig::resolve_with_env(Preset::OpenAi, overrides, no_env).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("***"));
    }

    // ========== Pipeline Settings Tests ==========

    #[test]
    fn test_pipeline_defaults() {
        let settings = PipelineSettings::new("English", "Romanian");
        assert_eq!(settings.context_size, 5);
        assert_eq!(settings.prefill_size, 3);
        assert_eq!(settings.context_word_budget, 512);
        assert!(settings.selection.is_all());
        assert!(!settings.is_copy());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_pipeline_validation() {
        assert!(PipelineSettings::new("", "Romanian").validate().is_err());
        let mut settings = PipelineSettings::new("English", "Romanian");
        settings.max_chunk_chars = 0;
        assert!(settings.validate().is_err());
        assert!(PipelineSettings::new("English", "english").is_copy());
    }
}
