use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

/// Load a settings struct from the layered sources shared by every service.
///
/// Precedence, lowest first: serde defaults, an optional `configuration.*`
/// file in the working directory, then `APP__`-prefixed environment variables
/// (`APP__BOT__PORT` maps to `bot.port`). Keys listed in `list_keys` are
/// parsed from comma-separated environment values.
pub fn load_settings<T: DeserializeOwned>(list_keys: &[&str]) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let mut environment = Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true);
    if !list_keys.is_empty() {
        environment = environment.list_separator(",");
        for key in list_keys {
            environment = environment.with_list_parse_key(key);
        }
    }

    let config = Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(environment)
        .build()?;

    Ok(config.try_deserialize()?)
}
