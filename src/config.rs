use std::env;
use std::fs;
use std::path::Path;

use lobby_core::config::StoreConfig;
use lobby_core::{ErrorKind, Result};
use log::info;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "LOBBY_CLIENT_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Ticks between two bots joining a waiting lobby
    pub bot_join_ticks: u32,
    /// Ticks a game runs before it ends
    pub game_ticks: u32,
    pub start_with_unfinished_game: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            bot_join_ticks: 20,
            game_ticks: 100,
            start_with_unfinished_game: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub username: String,
    pub tick_interval_ms: u64,
    pub event_history: usize,
    pub store: StoreConfig,
    pub loopback: LoopbackConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: "player".to_owned(),
            tick_interval_ms: 100,
            event_history: 500,
            store: StoreConfig::default(),
            loopback: LoopbackConfig::default(),
        }
    }
}

/// Read the file named by `LOBBY_CLIENT_CONFIG`, or fall back to defaults.
pub fn load() -> Result<ClientConfig> {
    match env::var(CONFIG_ENV) {
        Ok(path) => load_from(path),
        Err(_) => {
            info!("{} not set, using default configuration", CONFIG_ENV);
            Ok(ClientConfig::default())
        }
    }
}

pub fn load_from<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let text = fs::read_to_string(path.as_ref()).map_err(|err| {
        Box::new(ErrorKind::Config(format!(
            "Could not read {}: {}",
            path.as_ref().display(),
            err
        )))
    })?;
    let config = parse(&text)?;
    info!("Loaded configuration from {}", path.as_ref().display());
    Ok(config)
}

pub fn parse(text: &str) -> Result<ClientConfig> {
    ron::from_str(text)
        .map_err(|err| Box::new(ErrorKind::Config(format!("Invalid configuration: {}", err))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobby_core::config::CapacityRange;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse(
            r#"(
                username: "kuba",
                store: (makao_capacity: (min: 2, max: 5)),
            )"#,
        )
        .unwrap();
        assert_eq!(config.username, "kuba");
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.store.makao_capacity, CapacityRange { min: 2, max: 5 });
        assert_eq!(config.store.ludo_capacity, CapacityRange { min: 2, max: 4 });
        assert_eq!(config.loopback, LoopbackConfig::default());
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let err = parse("(username: 3)").unwrap_err();
        assert!(matches!(*err, ErrorKind::Config(_)));
    }
}
