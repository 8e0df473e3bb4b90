//! One authoritative game instance: entities, session and rules.
//!
//! `GameWorld` never touches sockets or clocks. Every operation takes the
//! current time in milliseconds and returns plain results, so the whole
//! simulation can be driven from tests.

use crate::session::{SessionCoordinator, SessionEvent, StartRequest};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::action::{ActionKind, ActionSpec};
use shared::config::{GameConfig, GameMode};
use shared::entity::{ConnectionId, Entity};
use shared::math::Vec2;
use shared::protocol::{GameOverSummary, MovementInput, RejectReason, ServerMessage, WorldSnapshot};
use shared::rules::{self, Hit, TickContext};
use shared::session::{EliminationReason, EliminationRecord, Phase};
use shared::store::EntityStore;
use shared::tiles::TileMap;

/// Everything an attack changed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombatReport {
    pub hits: Vec<Hit>,
    pub eliminations: Vec<EliminationRecord>,
    pub game_over: Option<GameOverSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaveReport {
    pub entity: Entity,
    pub game_over: Option<GameOverSummary>,
}

pub struct GameWorld {
    config: GameConfig,
    store: EntityStore,
    session: SessionCoordinator,
    tiles: Option<TileMap>,
    rng: StdRng,
    tick: u64,
}

impl GameWorld {
    pub fn new(config: GameConfig) -> Self {
        let mut rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let tiles = config
            .tiles
            .as_ref()
            .map(|tile_config| TileMap::generate(tile_config, &mut rng));
        Self {
            session: SessionCoordinator::new(config.clone()),
            config,
            store: EntityStore::new(),
            tiles,
            rng,
            tick: 0,
        }
    }

    pub fn mode(&self) -> GameMode {
        self.config.mode
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn session(&self) -> &SessionCoordinator {
        &self.session
    }

    pub fn tiles(&self) -> Option<&TileMap> {
        self.tiles.as_ref()
    }

    /// Replaces the generated grid, mostly so tests can use a known layout.
    pub fn set_tiles(&mut self, tiles: TileMap) {
        self.tiles = Some(tiles);
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn welcome(&self, id: ConnectionId) -> ServerMessage {
        ServerMessage::Welcome {
            connection_id: id,
            mode: self.config.mode,
            tick_rate: self.config.tick_rate,
            map: self.config.map,
            tiles: self.tiles.clone(),
        }
    }

    pub fn join(
        &mut self,
        id: ConnectionId,
        name: Option<String>,
        now: u64,
    ) -> Result<Entity, RejectReason> {
        self.session
            .join(&mut self.store, id, name, now, &mut self.rng)
    }

    /// Removes the entity and re-checks the end condition. Damage the
    /// entity already dealt stays applied.
    pub fn leave(&mut self, id: ConnectionId, now: u64) -> Option<LeaveReport> {
        let entity = self.session.leave(&mut self.store, id)?;
        let game_over = self.session.try_end(&self.store, now);
        Some(LeaveReport { entity, game_over })
    }

    /// Applies one movement sample. `Ok(false)` means the input was
    /// absorbed without effect: stale sequence, dead entity, or a phase
    /// that does not accept movement.
    pub fn apply_input(
        &mut self,
        id: ConnectionId,
        input: &MovementInput,
    ) -> Result<bool, RejectReason> {
        let movement = self.config.movement.ok_or(RejectReason::Unsupported)?;
        if !input.movement.is_finite() {
            return Err(RejectReason::InvalidInput);
        }
        let gated = self.config.session.gate_input_on_phase && self.session.phase() != Phase::Playing;
        let entity = self.store.get_mut(id).ok_or(RejectReason::NotJoined)?;

        if !entity.is_alive() || gated || input.sequence <= entity.last_processed_input {
            debug!(
                "Absorbed input {} from {} (last processed {})",
                input.sequence, id, entity.last_processed_input
            );
            return Ok(false);
        }
        rules::apply_movement_input(entity, input, &movement, &self.config.map);
        Ok(true)
    }

    pub fn attack(&mut self, id: ConnectionId, aim: Vec2, now: u64) -> Result<CombatReport, RejectReason> {
        let combat = self.config.combat.ok_or(RejectReason::Unsupported)?;
        if !self.store.contains(id) {
            return Err(RejectReason::NotJoined);
        }
        if self.config.session.gate_input_on_phase && self.session.phase() != Phase::Playing {
            return Err(RejectReason::NotPlaying);
        }

        let outcome = rules::apply_attack(&mut self.store, id, aim, &combat)?;
        let eliminations = self.record_hits(&outcome.hits, EliminationReason::Combat, now);
        let game_over = if eliminations.is_empty() {
            None
        } else {
            self.session.try_end(&self.store, now)
        };
        Ok(CombatReport {
            hits: outcome.hits,
            eliminations,
            game_over,
        })
    }

    pub fn perform_action(&mut self, id: ConnectionId, kind: ActionKind) -> Result<ActionSpec, RejectReason> {
        if self.config.energy.is_none() {
            return Err(RejectReason::Unsupported);
        }
        let entity = self.store.get_mut(id).ok_or(RejectReason::NotJoined)?;
        rules::apply_action(entity, kind, &self.config.map)
    }

    pub fn move_to(&mut self, id: ConnectionId, x: u32, y: u32) -> Result<usize, RejectReason> {
        let (Some(tiles), Some(tile_config)) = (self.tiles.as_ref(), self.config.tiles.as_ref()) else {
            return Err(RejectReason::Unsupported);
        };
        let entity = self.store.get_mut(id).ok_or(RejectReason::NotJoined)?;
        rules::request_path(entity, tiles, (x, y), tile_config.max_path_len)
    }

    pub fn apply_force(&mut self, id: ConnectionId, force: Vec2) -> Result<(), RejectReason> {
        if self.config.physics.is_none() {
            return Err(RejectReason::Unsupported);
        }
        let entity = self.store.get_mut(id).ok_or(RejectReason::NotJoined)?;
        rules::apply_force(entity, force)
    }

    pub fn respawn(&mut self, id: ConnectionId) -> Result<Vec2, RejectReason> {
        if !self.config.session.allow_respawn {
            return Err(RejectReason::Unsupported);
        }
        if !self.store.contains(id) {
            return Err(RejectReason::NotJoined);
        }
        let position = self.session.spawn_position(&mut self.rng);
        let max_energy = self.config.energy.as_ref().map(|energy| energy.max);
        if let Some(entity) = self.store.get_mut(id) {
            entity.respawn(position, max_energy);
        }
        Ok(position)
    }

    pub fn request_start(&mut self, id: ConnectionId, now: u64) -> Result<StartRequest, RejectReason> {
        if !self.store.contains(id) {
            return Err(RejectReason::NotJoined);
        }
        self.session.request_start(now)
    }

    /// Advances the world by one tick and returns what to broadcast.
    ///
    /// Order: session timers, per-entity continuous rules, pairwise
    /// collisions, eliminations and, if anyone fell, the end check. Then
    /// either a full snapshot or a lightweight tick notice.
    pub fn tick(&mut self, now: u64) -> Vec<ServerMessage> {
        self.tick += 1;
        let mut messages = Vec::new();
        let mut eliminated = false;

        for event in self.session.poll_timers(&mut self.store, now, &mut self.rng) {
            match event {
                SessionEvent::Countdown { remaining } => {
                    messages.push(ServerMessage::GameStarting {
                        countdown: remaining,
                        message: format!("Game starting in {}...", remaining),
                    });
                }
                SessionEvent::Started {
                    game_id,
                    player_count,
                } => messages.push(ServerMessage::GameStarted {
                    game_id,
                    player_count,
                }),
                SessionEvent::HazardShrunk { .. } => {
                    let damage = self.config.hazard.as_ref().map_or(0, |h| h.shrink_damage);
                    if let Some(zone) = self.session.state().hazard {
                        let hits = rules::apply_shrink_damage(&mut self.store, &zone, damage);
                        for record in self.record_hits(&hits, EliminationReason::Storm, now) {
                            messages.push(eliminated_message(&record));
                            eliminated = true;
                        }
                    }
                }
                SessionEvent::Reset { game_id } => messages.push(ServerMessage::GameReset { game_id }),
            }
        }

        for record in self.advance_entities(now) {
            messages.push(eliminated_message(&record));
            eliminated = true;
        }

        // Only a fall can end the round from inside a tick.
        if eliminated {
            if let Some(summary) = self.session.try_end(&self.store, now) {
                messages.push(ServerMessage::GameOver(summary));
            }
        }

        let every = u64::from(self.config.snapshot_every_ticks.max(1));
        if self.tick % every == 0 {
            messages.push(ServerMessage::Snapshot(self.snapshot(now)));
        } else {
            messages.push(ServerMessage::Tick {
                tick: self.tick,
                timestamp: now,
            });
        }
        messages
    }

    pub fn snapshot(&self, now: u64) -> WorldSnapshot {
        let state = self.session.state();
        WorldSnapshot {
            mode: self.config.mode,
            game_id: state.game_id,
            phase: state.phase,
            tick: self.tick,
            timestamp: now,
            started_at: state.started_at,
            entities: self.store.snapshot(),
            hazard: state.hazard,
            alive_count: self.store.alive_count(),
        }
    }

    fn advance_entities(&mut self, now: u64) -> Vec<EliminationRecord> {
        let ctx = TickContext {
            config: &self.config,
            phase: self.session.phase(),
            hazard: self.session.state().hazard,
            dt: self.config.tick_dt(),
        };

        let mut fallen = Vec::new();
        for entity in self.store.iter_mut() {
            let before = entity.clone();
            match rules::apply_continuous_rules(entity, &ctx, &mut self.rng) {
                Ok(outcome) => {
                    if let Some(reason) = outcome.eliminated {
                        fallen.push((entity.id, reason));
                    }
                }
                Err(err) => {
                    warn!("{}; keeping its previous state", err);
                    *entity = before;
                }
            }
        }

        if let Some(physics) = self.config.physics.as_ref() {
            rules::apply_collisions(&mut self.store, physics, &self.config.map);
        }

        // Same-tick falls are ranked as if they happened one by one in id
        // order, so the lowest id finishes last among them.
        let alive_after = self.store.alive_count();
        let count = fallen.len();
        let mut records = Vec::new();
        for (index, (id, reason)) in fallen.into_iter().enumerate() {
            let alive_at_fall = alive_after + (count - 1 - index);
            if let Some(entity) = self.store.get(id) {
                records.extend(self.session.record_elimination(entity, reason, alive_at_fall, now));
            }
        }
        records
    }

    fn record_hits(&mut self, hits: &[Hit], reason: EliminationReason, now: u64) -> Vec<EliminationRecord> {
        let mut records = Vec::new();
        for hit in hits.iter().filter(|hit| hit.eliminated) {
            if let Some(entity) = self.store.get(hit.target) {
                records.extend(self.session.record_elimination(entity, reason, hit.alive_after, now));
            }
        }
        records
    }
}

pub fn eliminated_message(record: &EliminationRecord) -> ServerMessage {
    ServerMessage::Eliminated {
        id: record.entity_id,
        reason: record.reason,
        rank: record.rank,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::entity::Body;

    fn seeded(mut config: GameConfig) -> GameWorld {
        config.rng_seed = Some(11);
        GameWorld::new(config)
    }

    fn playing_royale(players: u32) -> GameWorld {
        let mut world = seeded(GameConfig::battle_royale());
        for id in 1..=players {
            world.join(ConnectionId(id), None, 0).unwrap();
        }
        world.tick(2_000);
        assert_eq!(world.session().phase(), Phase::Playing);
        world
    }

    fn input(x: f32, sequence: u32) -> MovementInput {
        MovementInput {
            movement: Vec2::new(x, 0.0),
            direction: None,
            sequence,
        }
    }

    #[test]
    fn test_auto_start_broadcasts_game_started() {
        let mut world = seeded(GameConfig::battle_royale());
        world.join(ConnectionId(1), None, 0).unwrap();

        let messages = world.tick(2_000);

        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::GameStarted { player_count: 1, .. }
        )));
        assert!(matches!(messages.last(), Some(ServerMessage::Snapshot(_))));
    }

    #[test]
    fn test_solo_round_keeps_playing() {
        let mut world = playing_royale(1);
        for tick in 1..=30u64 {
            let messages = world.tick(2_000 + tick * 16);
            assert!(!messages.iter().any(|m| matches!(m, ServerMessage::GameOver(_))));
        }
        assert_eq!(world.session().phase(), Phase::Playing);
    }

    /// Battle royale where every tick outside the zone costs 1 health.
    fn certain_storm(players: u32) -> GameWorld {
        let mut config = GameConfig::battle_royale();
        if let Some(hazard) = config.hazard.as_mut() {
            hazard.tick_damage_probability = 1.0;
        }
        let mut world = seeded(config);
        for id in 1..=players {
            world.join(ConnectionId(id), None, 0).unwrap();
            world.store_mut().get_mut(ConnectionId(id)).unwrap().position = Vec2::new(1024.0, 1024.0);
        }
        world.tick(2_000);
        assert_eq!(world.session().phase(), Phase::Playing);
        world
    }

    fn strand(world: &mut GameWorld, id: u32) {
        let entity = world.store_mut().get_mut(ConnectionId(id)).unwrap();
        entity.position = Vec2::new(10.0, 10.0);
        entity.health = 1;
    }

    fn eliminated_ranks(messages: &[ServerMessage]) -> Vec<(ConnectionId, u32)> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Eliminated { id, rank, .. } => Some((*id, *rank)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_same_tick_storm_falls_get_distinct_ranks() {
        let mut world = certain_storm(3);
        strand(&mut world, 1);
        strand(&mut world, 2);

        let messages = world.tick(2_016);

        assert_eq!(
            eliminated_ranks(&messages),
            vec![(ConnectionId(1), 3), (ConnectionId(2), 2)]
        );
        let summary = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::GameOver(summary) => Some(summary.clone()),
                _ => None,
            })
            .expect("one survivor ends the round");
        assert_eq!(summary.winner, Some(ConnectionId(3)));
        let ranks: Vec<u32> = summary.rankings.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_last_two_falling_together_share_no_rank() {
        let mut world = certain_storm(2);
        strand(&mut world, 1);
        strand(&mut world, 2);

        let messages = world.tick(2_016);

        assert_eq!(
            eliminated_ranks(&messages),
            vec![(ConnectionId(1), 2), (ConnectionId(2), 1)]
        );
        assert_eq!(world.session().phase(), Phase::Ended);
        let ranks: Vec<u32> = world
            .session()
            .state()
            .elimination_log
            .iter()
            .map(|r| r.rank)
            .collect();
        assert_eq!(ranks, vec![2, 1]);
    }

    #[test]
    fn test_input_gated_until_playing() {
        let mut world = seeded(GameConfig::battle_royale());
        world.join(ConnectionId(1), None, 0).unwrap();

        assert_eq!(world.apply_input(ConnectionId(1), &input(1.0, 1)), Ok(false));
        assert_eq!(world.store().get(ConnectionId(1)).unwrap().last_processed_input, 0);

        world.tick(2_000);
        assert_eq!(world.apply_input(ConnectionId(1), &input(1.0, 1)), Ok(true));
    }

    #[test]
    fn test_stale_input_is_absorbed() {
        let mut world = playing_royale(1);
        let id = ConnectionId(1);

        world.apply_input(id, &input(1.0, 7)).unwrap();
        let after_seven = world.store().get(id).unwrap().position;

        assert_eq!(world.apply_input(id, &input(-1.0, 5)), Ok(false));
        let entity = world.store().get(id).unwrap();
        assert_eq!(entity.position, after_seven);
        assert_eq!(entity.last_processed_input, 7);
    }

    #[test]
    fn test_input_validation() {
        let mut world = playing_royale(1);
        let bad = MovementInput {
            movement: Vec2::new(f32::NAN, 0.0),
            direction: None,
            sequence: 1,
        };
        assert_eq!(world.apply_input(ConnectionId(1), &bad), Err(RejectReason::InvalidInput));
        assert_eq!(world.apply_input(ConnectionId(9), &input(1.0, 1)), Err(RejectReason::NotJoined));

        let mut boxing = seeded(GameConfig::boxing());
        boxing.join(ConnectionId(1), None, 0).unwrap();
        assert_eq!(boxing.apply_input(ConnectionId(1), &input(1.0, 1)), Err(RejectReason::Unsupported));
    }

    #[test]
    fn test_attack_requires_playing_phase() {
        let mut world = seeded(GameConfig::battle_royale());
        world.join(ConnectionId(1), None, 0).unwrap();
        assert_eq!(
            world.attack(ConnectionId(1), Vec2::ZERO, 0),
            Err(RejectReason::NotPlaying)
        );
    }

    #[test]
    fn test_fatal_attack_ends_two_player_game() {
        let mut world = playing_royale(2);
        let spot = world.store().get(ConnectionId(1)).unwrap().position;
        world.store_mut().get_mut(ConnectionId(2)).unwrap().position = spot.add(&Vec2::new(10.0, 0.0));
        world.store_mut().get_mut(ConnectionId(2)).unwrap().health = 25;

        let report = world.attack(ConnectionId(1), spot, 2_500).unwrap();

        assert_eq!(report.eliminations.len(), 1);
        assert_eq!(report.eliminations[0].rank, 2);
        let summary = report.game_over.unwrap();
        assert_eq!(summary.winner, Some(ConnectionId(1)));
        assert_eq!(summary.rankings[0].rank, 1);
        assert_eq!(world.session().phase(), Phase::Ended);
    }

    #[test]
    fn test_leave_can_end_game() {
        let mut world = playing_royale(2);
        let report = world.leave(ConnectionId(2), 3_000).unwrap();
        assert_eq!(report.entity.id, ConnectionId(2));
        assert_eq!(report.game_over.unwrap().winner, Some(ConnectionId(1)));
        assert!(world.leave(ConnectionId(2), 3_000).is_none());
    }

    #[test]
    fn test_faulty_entity_does_not_stop_others() {
        let mut world = seeded(GameConfig::physics());
        world.join(ConnectionId(1), None, 0).unwrap();
        world.join(ConnectionId(2), None, 0).unwrap();
        {
            let store = world.store_mut();
            let broken = store.get_mut(ConnectionId(1)).unwrap();
            broken.position = Vec2::new(100.0, 100.0);
            broken.body = Some(Body {
                velocity: Vec2::new(f32::NAN, 0.0),
                radius: 20.0,
                mass: 1.0,
            });
            store.get_mut(ConnectionId(2)).unwrap().position = Vec2::new(400.0, 100.0);
        }

        world.tick(16);

        let store = world.store();
        assert_eq!(store.get(ConnectionId(1)).unwrap().position, Vec2::new(100.0, 100.0));
        let healthy = store.get(ConnectionId(2)).unwrap();
        assert!(healthy.position.y > 100.0);
        assert!(healthy.body.unwrap().velocity.y > 0.0);
    }

    #[test]
    fn test_tile_world_snapshot_cadence() {
        let mut world = seeded(GameConfig::tile_world());
        world.join(ConnectionId(1), None, 0).unwrap();

        for tick in 1..=4u64 {
            let messages = world.tick(tick * 200);
            assert!(matches!(messages.last(), Some(ServerMessage::Tick { .. })));
        }
        let messages = world.tick(1_000);
        assert!(matches!(messages.last(), Some(ServerMessage::Snapshot(_))));
    }

    #[test]
    fn test_tile_world_walks_requested_path() {
        let mut world = seeded(GameConfig::tile_world());
        world.set_tiles(TileMap::open(25, 18));
        world.join(ConnectionId(1), None, 0).unwrap();
        assert_eq!(world.store().get(ConnectionId(1)).unwrap().position, Vec2::new(12.0, 9.0));

        assert_eq!(world.move_to(ConnectionId(1), 15, 9), Ok(3));
        for tick in 1..=3u64 {
            world.tick(tick * 200);
        }
        assert_eq!(world.store().get(ConnectionId(1)).unwrap().position, Vec2::new(15.0, 9.0));
        assert_eq!(world.move_to(ConnectionId(1), 0, 0), Err(RejectReason::Unwalkable));
    }

    #[test]
    fn test_respawn_only_where_enabled() {
        let mut royale = playing_royale(1);
        assert_eq!(royale.respawn(ConnectionId(1)), Err(RejectReason::Unsupported));

        let mut boxing = seeded(GameConfig::boxing());
        boxing.join(ConnectionId(1), None, 0).unwrap();
        boxing.perform_action(ConnectionId(1), ActionKind::Hook).unwrap();
        let position = boxing.respawn(ConnectionId(1)).unwrap();

        let entity = boxing.store().get(ConnectionId(1)).unwrap();
        assert_eq!(position, Vec2::new(300.0, 200.0));
        assert_eq!(entity.energy, Some(100.0));
        assert_eq!(entity.cooldown, 0);
    }

    #[test]
    fn test_welcome_carries_tiles_only_for_tile_world() {
        let tile_world = seeded(GameConfig::tile_world());
        match tile_world.welcome(ConnectionId(3)) {
            ServerMessage::Welcome { connection_id, tiles, .. } => {
                assert_eq!(connection_id, ConnectionId(3));
                assert!(tiles.is_some());
            }
            other => panic!("Unexpected message {:?}", other),
        }

        let royale = seeded(GameConfig::battle_royale());
        match royale.welcome(ConnectionId(3)) {
            ServerMessage::Welcome { tiles, .. } => assert!(tiles.is_none()),
            other => panic!("Unexpected message {:?}", other),
        }
    }
}
