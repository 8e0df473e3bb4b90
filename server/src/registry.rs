use crate::game::GameWorld;
use crate::settings::ServerSettings;
use log::info;
use shared::config::{ConfigError, GameMode};
use std::collections::BTreeMap;

/// Owns one independent [`GameWorld`] per game mode, created on first use.
pub struct SessionRegistry {
    settings: ServerSettings,
    worlds: BTreeMap<GameMode, GameWorld>,
}

impl SessionRegistry {
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            settings,
            worlds: BTreeMap::new(),
        }
    }

    /// The room for `mode`, building it from the settings if needed.
    pub fn world_mut(&mut self, mode: GameMode) -> Result<&mut GameWorld, ConfigError> {
        if !self.worlds.contains_key(&mode) {
            let config = self.settings.game_config(mode)?;
            info!("Creating {} room ({} Hz)", mode, config.tick_rate);
            self.worlds.insert(mode, GameWorld::new(config));
        }
        self.worlds
            .get_mut(&mode)
            .ok_or_else(|| ConfigError::UnknownMode(mode.to_string()))
    }

    pub fn get(&self, mode: GameMode) -> Option<&GameWorld> {
        self.worlds.get(&mode)
    }

    pub fn get_mut(&mut self, mode: GameMode) -> Option<&mut GameWorld> {
        self.worlds.get_mut(&mode)
    }

    pub fn modes(&self) -> impl Iterator<Item = GameMode> + '_ {
        self.worlds.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}
