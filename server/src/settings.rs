//! Server settings, optionally loaded from a TOML file.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! default_mode = "battle-royale"
//! max_clients = 64
//! client_timeout_secs = 30
//!
//! [modes.battle-royale]
//! attack_damage = 30
//! rng_seed = 7
//! ```

use crate::error::ServerError;
use serde::Deserialize;
use shared::config::{ConfigError, GameConfig, GameMode, ModeOverrides};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Room used for connections to `/`.
    pub default_mode: GameMode,
    pub max_clients: usize,
    pub client_timeout_secs: u64,
    pub modes: BTreeMap<GameMode, ModeOverrides>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            default_mode: GameMode::BattleRoyale,
            max_clients: 64,
            client_timeout_secs: 30,
            modes: BTreeMap::new(),
        }
    }
}

impl ServerSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, ServerError> {
        let settings: ServerSettings = toml::from_str(text)?;
        for mode in GameMode::ALL {
            settings.game_config(mode)?;
        }
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::SettingsIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    /// Preset for `mode` with this file's overrides applied and validated.
    pub fn game_config(&self, mode: GameMode) -> Result<GameConfig, ConfigError> {
        let preset = GameConfig::for_mode(mode);
        let config = match self.modes.get(&mode) {
            Some(overrides) => preset.with_overrides(overrides),
            None => preset,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = ServerSettings::default();
        assert_eq!(settings.bind_addr(), "127.0.0.1:8080");
        assert_eq!(settings.client_timeout(), Duration::from_secs(30));
        assert_eq!(
            settings.game_config(GameMode::Boxing).unwrap(),
            GameConfig::boxing()
        );
    }

    #[test]
    fn test_partial_file_keeps_presets() {
        let settings = ServerSettings::from_toml_str(
            r#"
            port = 9001
            default_mode = "tile-world"

            [modes.battle-royale]
            attack_damage = 30
            rng_seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(settings.port, 9001);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.default_mode, GameMode::TileWorld);

        let config = settings.game_config(GameMode::BattleRoyale).unwrap();
        assert_eq!(config.combat.unwrap().damage, 30);
        assert_eq!(config.combat.unwrap().range, 64.0);
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = ServerSettings::from_toml_str("prot = 9001");
        assert!(matches!(result, Err(ServerError::Settings(_))));

        let result = ServerSettings::from_toml_str("[modes.boxing]\ndamage = 3");
        assert!(matches!(result, Err(ServerError::Settings(_))));
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let result = ServerSettings::from_toml_str("[modes.physics]\ntick_rate = 0.0");
        assert!(matches!(
            result,
            Err(ServerError::Config(ConfigError::InvalidTickRate(_)))
        ));

        // Fast enough to round the tick period down to nothing.
        let result = ServerSettings::from_toml_str("[modes.boxing]\ntick_rate = 1e12");
        assert!(matches!(
            result,
            Err(ServerError::Config(ConfigError::InvalidTickRate(_)))
        ));
    }
}
