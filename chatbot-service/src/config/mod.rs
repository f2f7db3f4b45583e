use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

use crate::normalizer::DEFAULT_STOP_PHRASES;

/// Environment keys that carry comma-separated lists.
const LIST_KEYS: &[&str] = &["normalizer.stop_phrases"];

#[derive(Debug, Clone, Deserialize)]
pub struct ChatbotConfig {
    /// HTTP port for health and metrics.
    #[serde(flatten)]
    pub common: core_config::Config,
    #[serde(default)]
    pub bot: BotServerConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

/// The raw TCP endpoint clients talk to.
#[derive(Debug, Clone, Deserialize)]
pub struct BotServerConfig {
    #[serde(default = "default_bot_port")]
    pub port: u16,
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,
    /// Maximum number of connections processed at once.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Size of the single read a request must fit in.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for BotServerConfig {
    fn default() -> Self {
        Self {
            port: default_bot_port(),
            listen_backlog: default_listen_backlog(),
            worker_pool_size: default_worker_pool_size(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    Inference,
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_provider")]
    pub provider: GeneratorKind,
    /// Base URL of the text-generation inference server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: u32,
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_input_tokens: default_max_input_tokens(),
            do_sample: default_do_sample(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_stop_phrases")]
    pub stop_phrases: Vec<String>,
    /// Answers longer than this (in characters) are cut at the last sentence end.
    #[serde(default = "default_sentence_trim_threshold")]
    pub sentence_trim_threshold: usize,
    #[serde(default = "default_min_unique_ratio")]
    pub min_unique_ratio: f64,
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            stop_phrases: default_stop_phrases(),
            sentence_trim_threshold: default_sentence_trim_threshold(),
            min_unique_ratio: default_min_unique_ratio(),
            min_answer_chars: default_min_answer_chars(),
        }
    }
}

fn default_bot_port() -> u16 {
    5050
}

fn default_listen_backlog() -> u32 {
    1000
}

fn default_worker_pool_size() -> usize {
    10
}

fn default_max_message_bytes() -> usize {
    2048
}

fn default_provider() -> GeneratorKind {
    GeneratorKind::Inference
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_new_tokens() -> u32 {
    100
}

fn default_temperature() -> f32 {
    0.8
}

fn default_top_k() -> u32 {
    30
}

fn default_top_p() -> f32 {
    0.95
}

fn default_max_input_tokens() -> u32 {
    512
}

fn default_do_sample() -> bool {
    true
}

fn default_stop_phrases() -> Vec<String> {
    DEFAULT_STOP_PHRASES.iter().map(|p| p.to_string()).collect()
}

fn default_sentence_trim_threshold() -> usize {
    50
}

fn default_min_unique_ratio() -> f64 {
    0.7
}

fn default_min_answer_chars() -> usize {
    5
}

impl ChatbotConfig {
    pub fn load() -> Result<Self, AppError> {
        let config: ChatbotConfig = core_config::load_settings(LIST_KEYS)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the dispatcher or normalizer cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.bot.worker_pool_size == 0 {
            return Err(config_error("bot.worker_pool_size must be at least 1"));
        }
        if self.bot.max_message_bytes == 0 {
            return Err(config_error("bot.max_message_bytes must be at least 1"));
        }
        let ratio = self.normalizer.min_unique_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(config_error("normalizer.min_unique_ratio must be in (0, 1]"));
        }
        if self.generator.provider == GeneratorKind::Inference
            && self.generator.endpoint.trim().is_empty()
        {
            return Err(config_error(
                "generator.endpoint is required for the inference provider",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("{}", message))
}
