use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub bot: BotClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotClientConfig {
    /// `host:port` of the chatbot TCP endpoint.
    #[serde(default = "default_bot_address")]
    pub address: String,
    /// Upper bound for one forwarded exchange, generation included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
}

impl Default for BotClientConfig {
    fn default() -> Self {
        Self {
            address: default_bot_address(),
            timeout_secs: default_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

fn default_port() -> u16 {
    5000
}

fn default_bot_address() -> String {
    "127.0.0.1:5050".to_string()
}

fn default_timeout_secs() -> u64 {
    130
}

fn default_max_response_bytes() -> u64 {
    65_536
}

impl GatewayConfig {
    pub fn load() -> Result<Self, AppError> {
        core_config::load_settings(&[])
    }
}
