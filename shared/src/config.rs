//! Injected simulation configuration.
//!
//! Rules never hardcode gameplay numbers; every constant lives in a
//! [`GameConfig`] built from one of the mode presets and optionally adjusted
//! by [`ModeOverrides`].

use crate::math::{MapBounds, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown game mode '{0}'")]
    UnknownMode(String),
    #[error("tick rate must be in (0, 1000] Hz, got {0}")]
    InvalidTickRate(f32),
    #[error("map extents must be positive, got {width}x{height}")]
    InvalidMap { width: f32, height: f32 },
    #[error("hazard minimum radius {min} exceeds initial radius {initial}")]
    InvalidHazard { min: f32, initial: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    BattleRoyale,
    Boxing,
    TileWorld,
    Physics,
}

impl GameMode {
    pub const ALL: [GameMode; 4] = [
        GameMode::BattleRoyale,
        GameMode::Boxing,
        GameMode::TileWorld,
        GameMode::Physics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GameMode::BattleRoyale => "battle-royale",
            GameMode::Boxing => "boxing",
            GameMode::TileWorld => "tile-world",
            GameMode::Physics => "physics",
        }
    }

    /// Resolves a WebSocket request path. `/` maps to `default`.
    pub fn from_path(path: &str, default: GameMode) -> Result<GameMode, ConfigError> {
        match path.trim_matches('/') {
            "" => Ok(default),
            other => other.parse(),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GameMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s || mode.name().replace('-', "_") == s)
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Pixels per second at full input magnitude.
    pub speed: f32,
    /// Fixed timestep applied per movement input, shared with client prediction.
    pub input_dt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatConfig {
    pub range: f32,
    pub damage: u32,
    /// Ticks the attacker stays in the attacking state and cannot attack again.
    pub cooldown_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazardConfig {
    pub center: Vec2,
    pub initial_radius: f32,
    pub min_radius: f32,
    pub shrink_step: f32,
    pub shrink_interval_ms: u64,
    /// Damage dealt to everyone outside the zone at each shrink.
    pub shrink_damage: u32,
    /// Damage dealt per tick outside the zone when the per-tick roll succeeds.
    pub tick_damage: u32,
    pub tick_damage_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyConfig {
    pub max: f32,
    pub regen_per_tick: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Downward acceleration in pixels per second squared.
    pub gravity: f32,
    pub wall_restitution: f32,
    /// Horizontal velocity factor applied per tick while touching the floor.
    pub floor_friction: f32,
    pub collision_restitution: f32,
    pub radius: f32,
    pub mass: f32,
}

/// Rectangle of `width` by `height` tiles with its corner at (`x`, `y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x..self.x + self.width).contains(&x) && (self.y..self.y + self.height).contains(&y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileConfig {
    pub columns: u32,
    pub rows: u32,
    pub tree_density: f64,
    pub max_path_len: usize,
    /// Stone areas that never get trees.
    pub plaza: TileRect,
    pub road: TileRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpawnPolicy {
    /// Uniformly random, keeping `margin` away from every edge.
    Random { margin: f32 },
    Fixed(Vec2),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub auto_start_delay_ms: u64,
    pub reset_delay_ms: u64,
    pub countdown_secs: u32,
    pub min_players: usize,
    /// Enables the playing -> ended transition when at most one entity is alive.
    pub last_standing_wins: bool,
    /// Movement and attacks are only accepted while playing.
    pub gate_input_on_phase: bool,
    pub allow_mid_game_join: bool,
    pub allow_respawn: bool,
    pub spawn: SpawnPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub mode: GameMode,
    pub tick_rate: f32,
    pub map: MapBounds,
    pub max_health: u32,
    /// Full snapshots go out every n-th tick; other ticks send a tick notice.
    pub snapshot_every_ticks: u32,
    pub movement: Option<MovementConfig>,
    pub combat: Option<CombatConfig>,
    pub hazard: Option<HazardConfig>,
    pub energy: Option<EnergyConfig>,
    pub physics: Option<PhysicsConfig>,
    pub tiles: Option<TileConfig>,
    pub session: SessionConfig,
    pub rng_seed: Option<u64>,
}

const SIXTY_HZ: f32 = 60.0;
/// Upper bound keeping the tick period at a whole millisecond or more.
pub const MAX_TICK_RATE: f32 = 1000.0;

impl GameConfig {
    pub fn for_mode(mode: GameMode) -> Self {
        match mode {
            GameMode::BattleRoyale => Self::battle_royale(),
            GameMode::Boxing => Self::boxing(),
            GameMode::TileWorld => Self::tile_world(),
            GameMode::Physics => Self::physics(),
        }
    }

    pub fn battle_royale() -> Self {
        let map = MapBounds::new(2048.0, 2048.0);
        Self {
            mode: GameMode::BattleRoyale,
            tick_rate: SIXTY_HZ,
            map,
            max_health: 100,
            snapshot_every_ticks: 1,
            movement: Some(MovementConfig {
                speed: 200.0,
                input_dt: 1.0 / SIXTY_HZ,
            }),
            combat: Some(CombatConfig {
                range: 64.0,
                damage: 25,
                cooldown_ticks: 20,
            }),
            hazard: Some(HazardConfig {
                center: map.center(),
                initial_radius: 1024.0,
                min_radius: 100.0,
                shrink_step: 50.0,
                shrink_interval_ms: 10_000,
                shrink_damage: 10,
                tick_damage: 1,
                tick_damage_probability: 0.02,
            }),
            energy: None,
            physics: None,
            tiles: None,
            session: SessionConfig {
                auto_start_delay_ms: 2_000,
                reset_delay_ms: 10_000,
                countdown_secs: 3,
                min_players: 1,
                last_standing_wins: true,
                gate_input_on_phase: true,
                allow_mid_game_join: true,
                allow_respawn: false,
                spawn: SpawnPolicy::Random { margin: 100.0 },
            },
            rng_seed: None,
        }
    }

    pub fn boxing() -> Self {
        let map = MapBounds::new(600.0, 400.0);
        Self {
            mode: GameMode::Boxing,
            tick_rate: SIXTY_HZ,
            map,
            max_health: 100,
            snapshot_every_ticks: 1,
            movement: None,
            combat: None,
            hazard: None,
            energy: Some(EnergyConfig {
                max: 100.0,
                regen_per_tick: 0.2,
            }),
            physics: None,
            tiles: None,
            session: Self::sandbox_session(SpawnPolicy::Fixed(map.center())),
            rng_seed: None,
        }
    }

    pub fn tile_world() -> Self {
        let tiles = TileConfig {
            columns: 25,
            rows: 18,
            tree_density: 0.05,
            max_path_len: 50,
            plaza: TileRect::new(10, 8, 6, 3),
            road: TileRect::new(12, 5, 2, 9),
        };
        Self {
            mode: GameMode::TileWorld,
            tick_rate: 5.0,
            // Positions are tile coordinates, so the last column/row is the edge.
            map: MapBounds::new((tiles.columns - 1) as f32, (tiles.rows - 1) as f32),
            max_health: 100,
            snapshot_every_ticks: 5,
            movement: None,
            combat: None,
            hazard: None,
            energy: None,
            physics: None,
            tiles: Some(tiles),
            session: Self::sandbox_session(SpawnPolicy::Fixed(Vec2::new(12.0, 9.0))),
            rng_seed: None,
        }
    }

    pub fn physics() -> Self {
        let physics = PhysicsConfig {
            gravity: 1800.0,
            wall_restitution: 0.8,
            floor_friction: 0.98,
            collision_restitution: 1.0,
            radius: 20.0,
            mass: 1.0,
        };
        Self {
            mode: GameMode::Physics,
            tick_rate: SIXTY_HZ,
            map: MapBounds::new(600.0, 400.0),
            max_health: 100,
            snapshot_every_ticks: 1,
            movement: None,
            combat: None,
            hazard: None,
            energy: None,
            physics: Some(physics),
            tiles: None,
            session: Self::sandbox_session(SpawnPolicy::Random {
                margin: physics.radius,
            }),
            rng_seed: None,
        }
    }

    fn sandbox_session(spawn: SpawnPolicy) -> SessionConfig {
        SessionConfig {
            auto_start_delay_ms: 2_000,
            reset_delay_ms: 10_000,
            countdown_secs: 3,
            min_players: 1,
            last_standing_wins: false,
            gate_input_on_phase: false,
            allow_mid_game_join: true,
            allow_respawn: true,
            spawn,
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_rate)
    }

    /// Fixed simulation step in seconds used by continuous rules.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0 && self.tick_rate <= MAX_TICK_RATE) {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        if !(self.map.width > 0.0 && self.map.height > 0.0) {
            return Err(ConfigError::InvalidMap {
                width: self.map.width,
                height: self.map.height,
            });
        }
        if let Some(hazard) = &self.hazard {
            if hazard.min_radius > hazard.initial_radius {
                return Err(ConfigError::InvalidHazard {
                    min: hazard.min_radius,
                    initial: hazard.initial_radius,
                });
            }
        }
        Ok(())
    }

    pub fn with_overrides(mut self, overrides: &ModeOverrides) -> Self {
        if let Some(tick_rate) = overrides.tick_rate {
            self.tick_rate = tick_rate;
            if let Some(movement) = self.movement.as_mut() {
                movement.input_dt = 1.0 / tick_rate;
            }
        }
        if let Some(width) = overrides.map_width {
            self.map.width = width;
        }
        if let Some(height) = overrides.map_height {
            self.map.height = height;
        }
        if let Some(max_health) = overrides.max_health {
            self.max_health = max_health;
        }
        if let (Some(speed), Some(movement)) = (overrides.speed, self.movement.as_mut()) {
            movement.speed = speed;
        }
        if let Some(combat) = self.combat.as_mut() {
            if let Some(damage) = overrides.attack_damage {
                combat.damage = damage;
            }
            if let Some(range) = overrides.attack_range {
                combat.range = range;
            }
            if let Some(cooldown) = overrides.attack_cooldown_ticks {
                combat.cooldown_ticks = cooldown;
            }
        }
        if let (Some(step), Some(hazard)) = (overrides.hazard_shrink_step, self.hazard.as_mut()) {
            hazard.shrink_step = step;
        }
        if let Some(delay) = overrides.auto_start_delay_ms {
            self.session.auto_start_delay_ms = delay;
        }
        if let Some(delay) = overrides.reset_delay_ms {
            self.session.reset_delay_ms = delay;
        }
        if let Some(allow) = overrides.allow_mid_game_join {
            self.session.allow_mid_game_join = allow;
        }
        if overrides.rng_seed.is_some() {
            self.rng_seed = overrides.rng_seed;
        }
        self
    }
}

/// Partial adjustments read from a settings file; unset keys keep the preset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModeOverrides {
    pub tick_rate: Option<f32>,
    pub map_width: Option<f32>,
    pub map_height: Option<f32>,
    pub max_health: Option<u32>,
    pub speed: Option<f32>,
    pub attack_damage: Option<u32>,
    pub attack_range: Option<f32>,
    pub attack_cooldown_ticks: Option<u32>,
    pub hazard_shrink_step: Option<f32>,
    pub auto_start_delay_ms: Option<u64>,
    pub reset_delay_ms: Option<u64>,
    pub allow_mid_game_join: Option<bool>,
    pub rng_seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for mode in GameMode::ALL {
            let config = GameConfig::for_mode(mode);
            assert_eq!(config.mode, mode);
            assert_eq!(config.validate(), Ok(()));
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("battle-royale".parse::<GameMode>(), Ok(GameMode::BattleRoyale));
        assert_eq!("tile_world".parse::<GameMode>(), Ok(GameMode::TileWorld));
        assert_eq!(
            "chess".parse::<GameMode>(),
            Err(ConfigError::UnknownMode("chess".to_string()))
        );
    }

    #[test]
    fn test_mode_from_path() {
        assert_eq!(
            GameMode::from_path("/", GameMode::Boxing),
            Ok(GameMode::Boxing)
        );
        assert_eq!(
            GameMode::from_path("/physics", GameMode::Boxing),
            Ok(GameMode::Physics)
        );
        assert!(GameMode::from_path("/nope", GameMode::Boxing).is_err());
    }

    #[test]
    fn test_tick_period() {
        let config = GameConfig::tile_world();
        assert_eq!(config.tick_period().as_millis(), 200);
        assert_eq!(GameConfig::battle_royale().tick_period().as_micros(), 16_666);
    }

    #[test]
    fn test_overrides_only_touch_set_fields() {
        let overrides = ModeOverrides {
            tick_rate: Some(30.0),
            attack_damage: Some(40),
            ..Default::default()
        };
        let config = GameConfig::battle_royale().with_overrides(&overrides);
        assert_eq!(config.tick_rate, 30.0);
        assert_eq!(config.movement.unwrap().input_dt, 1.0 / 30.0);
        assert_eq!(config.combat.unwrap().damage, 40);
        assert_eq!(config.combat.unwrap().range, 64.0);
        assert_eq!(config.map, MapBounds::new(2048.0, 2048.0));
    }

    #[test]
    fn test_invalid_tick_rate_rejected() {
        let mut config = GameConfig::boxing();
        config.tick_rate = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidTickRate(0.0)));
    }

    #[test]
    fn test_absurd_tick_rate_override_rejected() {
        let overrides = ModeOverrides {
            tick_rate: Some(1e12),
            ..ModeOverrides::default()
        };
        let config = GameConfig::battle_royale().with_overrides(&overrides);
        assert_eq!(config.validate(), Err(ConfigError::InvalidTickRate(1e12)));

        let mut fastest = GameConfig::physics();
        fastest.tick_rate = MAX_TICK_RATE;
        assert!(fastest.validate().is_ok());
        assert!(!fastest.tick_period().is_zero());
    }
}
