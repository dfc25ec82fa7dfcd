use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::secrets::expand_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file. Defaults to `~/.quizgen/data/quizgen.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Root of the filesystem document store.
    pub document_directory: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Directory of `<name>.yml` prompt overrides.
    #[serde(default)]
    pub prompt_directory: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub model: ModelConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Config {
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }

    pub fn document_directory(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.document_directory))
    }

    pub fn prompt_directory(&self) -> Option<PathBuf> {
        self.prompt_directory
            .as_deref()
            .map(|dir| PathBuf::from(expand_home(dir)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total generation attempts per topic, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further retry.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_questions_per_topic")]
    pub questions_per_topic: u32,
    /// Number given to the first question of each quiz.
    #[serde(default = "default_start_index")]
    pub start_index: u32,
}

fn default_questions_per_topic() -> u32 {
    10
}

fn default_start_index() -> u32 {
    1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            questions_per_topic: default_questions_per_topic(),
            start_index: default_start_index(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Gemini,
    OpenAi,
}

impl ModelProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            ModelProvider::Gemini => "gemini-2.5-flash-lite",
            ModelProvider::OpenAi => "gpt-4o-mini",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ModelProvider::Gemini => "GEMINI_API_KEY",
            ModelProvider::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ModelProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ModelProvider::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelProvider::Gemini => write!(f, "gemini"),
            ModelProvider::OpenAi => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    /// Falls back to the provider's conventional variable when no source is set.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_model_timeout() -> u64 {
    120
}

impl ModelConfig {
    pub fn new(provider: ModelProvider) -> Self {
        Self {
            provider,
            model: None,
            api_key: None,
            api_key_file: None,
            api_key_env: None,
            base_url: None,
            timeout_secs: default_model_timeout(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay_secs, 1);
    }

    #[test]
    fn test_generation_defaults() {
        let generation = GenerationConfig::default();
        assert_eq!(generation.questions_per_topic, 10);
        assert_eq!(generation.start_index, 1);
    }

    #[test]
    fn test_model_defaults_per_provider() {
        let gemini = ModelConfig::new(ModelProvider::Gemini);
        assert_eq!(gemini.model_name(), "gemini-2.5-flash-lite");
        assert_eq!(gemini.timeout_secs, 120);
        assert!(gemini.base_url().starts_with("https://generativelanguage"));

        let mut openai = ModelConfig::new(ModelProvider::OpenAi);
        openai.model = Some("gpt-4.1".to_string());
        openai.base_url = Some("http://localhost:8080/v1/".to_string());
        assert_eq!(openai.model_name(), "gpt-4.1");
        assert_eq!(openai.base_url(), "http://localhost:8080/v1");
        assert_eq!(openai.provider.default_api_key_env(), "OPENAI_API_KEY");
    }

    #[test]
    fn test_provider_serde_names() {
        let provider: ModelProvider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(provider, ModelProvider::OpenAi);
        assert_eq!(provider.to_string(), "openai");
    }
}
