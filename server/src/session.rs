//! Per-room game lifecycle: waiting, playing, ended and reset.
//!
//! Deferred transitions (auto-start, countdown, hazard shrink, reset) are
//! stored as millisecond deadlines and fired by [`SessionCoordinator::poll_timers`]
//! from the room's tick. Clearing a deadline cancels it.

use log::{debug, info};
use rand::Rng;
use shared::config::{GameConfig, SpawnPolicy};
use shared::entity::{Body, ConnectionId, Entity};
use shared::math::Vec2;
use shared::protocol::{GameOverSummary, RejectReason};
use shared::rules;
use shared::session::{EliminationReason, EliminationRecord, HazardZone, Phase};
use shared::store::EntityStore;

const SECOND_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub game_id: u64,
    pub phase: Phase,
    pub started_at: Option<u64>,
    pub hazard: Option<HazardZone>,
    /// Append-only; defines the final ranking.
    pub elimination_log: Vec<EliminationRecord>,
    pub total_players: usize,
}

impl SessionState {
    fn fresh(game_id: u64, config: &GameConfig) -> Self {
        Self {
            game_id,
            phase: Phase::Waiting,
            started_at: None,
            hazard: config.hazard.as_ref().map(|hazard| HazardZone {
                center: hazard.center,
                radius: hazard.initial_radius,
            }),
            elimination_log: Vec::new(),
            total_players: 0,
        }
    }
}

/// Lifecycle changes produced by timers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Countdown { remaining: u32 },
    Started { game_id: u64, player_count: usize },
    HazardShrunk { radius: f32 },
    Reset { game_id: u64 },
}

/// Result of a client asking to start the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRequest {
    Countdown(u32),
    AlreadyRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countdown {
    remaining: u32,
    next_at: u64,
}

pub struct SessionCoordinator {
    config: GameConfig,
    state: SessionState,
    auto_start_at: Option<u64>,
    countdown: Option<Countdown>,
    next_shrink_at: Option<u64>,
    reset_at: Option<u64>,
}

impl SessionCoordinator {
    pub fn new(config: GameConfig) -> Self {
        let state = SessionState::fresh(1, &config);
        Self {
            config,
            state,
            auto_start_at: None,
            countdown: None,
            next_shrink_at: None,
            reset_at: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn auto_start_pending(&self) -> bool {
        self.auto_start_at.is_some()
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_at.is_some()
    }

    /// Creates and stores the entity for a new participant.
    ///
    /// The first join that brings a waiting room up to the player minimum
    /// arms a delayed auto-start.
    pub fn join<R: Rng + ?Sized>(
        &mut self,
        store: &mut EntityStore,
        id: ConnectionId,
        name: Option<String>,
        now: u64,
        rng: &mut R,
    ) -> Result<Entity, RejectReason> {
        if store.contains(id) {
            return Err(RejectReason::AlreadyJoined);
        }
        if self.state.phase != Phase::Waiting && !self.config.session.allow_mid_game_join {
            return Err(RejectReason::GameInProgress);
        }

        let name = name
            .map(|name| name.trim().chars().take(24).collect::<String>())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Player_{}", id));
        let mut entity = Entity::new(id, name, self.spawn_position(rng), self.config.max_health, now);
        if let Some(physics) = self.config.physics.as_ref() {
            entity = entity.with_body(Body::new(physics.radius, physics.mass));
        }
        if let Some(energy) = self.config.energy.as_ref() {
            entity = entity.with_energy(energy.max);
        }
        if self.state.phase == Phase::Ended {
            // Joiners of a finished round sit it out until the reset.
            entity.health = 0;
        }

        if !store.add(entity.clone()) {
            return Err(RejectReason::AlreadyJoined);
        }
        info!(
            "{} joined game {} as '{}' at ({:.1}, {:.1})",
            id, self.state.game_id, entity.name, entity.position.x, entity.position.y
        );

        if self.state.phase == Phase::Waiting
            && self.auto_start_at.is_none()
            && self.countdown.is_none()
            && store.len() >= self.config.session.min_players
        {
            self.auto_start_at = Some(now + self.config.session.auto_start_delay_ms);
            debug!(
                "Auto-start armed for game {} in {} ms",
                self.state.game_id, self.config.session.auto_start_delay_ms
            );
        }
        Ok(entity)
    }

    /// Removes a participant. Absent ids are a no-op.
    ///
    /// When the room empties every pending timer is cancelled and the
    /// session returns to a fresh waiting state.
    pub fn leave(&mut self, store: &mut EntityStore, id: ConnectionId) -> Option<Entity> {
        let entity = store.remove(id)?;
        info!("{} left game {}", id, self.state.game_id);

        if store.is_empty() {
            self.clear_timers();
            if self.state.phase != Phase::Waiting {
                self.state = SessionState::fresh(self.state.game_id + 1, &self.config);
                info!("Room emptied, game {} waiting", self.state.game_id);
            }
        } else if store.len() < self.config.session.min_players {
            self.auto_start_at = None;
            self.countdown = None;
        }
        Some(entity)
    }

    /// Moves a waiting session to playing if enough players are present.
    pub fn try_start(&mut self, store: &EntityStore, now: u64) -> Option<SessionEvent> {
        if self.state.phase != Phase::Waiting || store.len() < self.config.session.min_players {
            return None;
        }
        self.auto_start_at = None;
        self.countdown = None;

        self.state.phase = Phase::Playing;
        self.state.started_at = Some(now);
        self.state.total_players = store.len();
        self.next_shrink_at = self
            .config
            .hazard
            .as_ref()
            .map(|hazard| now + hazard.shrink_interval_ms);

        info!(
            "Game {} started with {} players",
            self.state.game_id, self.state.total_players
        );
        Some(SessionEvent::Started {
            game_id: self.state.game_id,
            player_count: self.state.total_players,
        })
    }

    /// The only path from playing to ended.
    ///
    /// Ends the game when last-standing wins apply and at most one live
    /// entity remains; the survivor is ranked first. Arms the reset timer.
    pub fn try_end(&mut self, store: &EntityStore, now: u64) -> Option<GameOverSummary> {
        if !self.config.session.last_standing_wins
            || !rules::check_end_condition(self.state.phase, store)
        {
            return None;
        }

        self.state.phase = Phase::Ended;
        self.next_shrink_at = None;
        self.countdown = None;
        self.auto_start_at = None;

        let winner = store.iter().find(|e| e.is_alive());
        if let Some(winner) = winner {
            self.state.elimination_log.push(EliminationRecord {
                entity_id: winner.id,
                name: winner.name.clone(),
                reason: EliminationReason::Winner,
                rank: 1,
                timestamp: now,
            });
        }

        let mut rankings = self.state.elimination_log.clone();
        rankings.sort_by_key(|record| record.rank);
        let duration_ms = self
            .state
            .started_at
            .map_or(0, |started| now.saturating_sub(started));

        self.reset_at = Some(now + self.config.session.reset_delay_ms);
        info!(
            "Game {} over after {} ms, winner {:?}",
            self.state.game_id,
            duration_ms,
            winner.map(|w| w.id.0)
        );

        Some(GameOverSummary {
            winner: winner.map(|w| w.id),
            rankings,
            total_players: self.state.total_players.max(store.len()),
            duration_ms,
        })
    }

    /// Starts a fresh game: new id, cleared log, every connected entity
    /// respawned. Nobody is dropped.
    pub fn reset<R: Rng + ?Sized>(
        &mut self,
        store: &mut EntityStore,
        now: u64,
        rng: &mut R,
    ) -> SessionEvent {
        self.clear_timers();
        self.state = SessionState::fresh(self.state.game_id + 1, &self.config);

        let max_energy = self.config.energy.as_ref().map(|energy| energy.max);
        for id in store.ids() {
            let position = self.spawn_position(rng);
            if let Some(entity) = store.get_mut(id) {
                entity.respawn(position, max_energy);
            }
        }

        if !store.is_empty() && store.len() >= self.config.session.min_players {
            self.auto_start_at = Some(now + self.config.session.auto_start_delay_ms);
        }
        info!("Game reset, now game {}", self.state.game_id);
        SessionEvent::Reset {
            game_id: self.state.game_id,
        }
    }

    /// Appends an elimination unless the entity already has one this game.
    ///
    /// Rank is the number of entities still alive after this one fell, plus
    /// one.
    pub fn record_elimination(
        &mut self,
        entity: &Entity,
        reason: EliminationReason,
        alive_after: usize,
        now: u64,
    ) -> Option<EliminationRecord> {
        if self
            .state
            .elimination_log
            .iter()
            .any(|record| record.entity_id == entity.id)
        {
            return None;
        }
        let record = EliminationRecord {
            entity_id: entity.id,
            name: entity.name.clone(),
            reason,
            rank: alive_after as u32 + 1,
            timestamp: now,
        };
        info!(
            "{} eliminated ({:?}), rank {}",
            entity.id, reason, record.rank
        );
        self.state.elimination_log.push(record.clone());
        Some(record)
    }

    /// Begins a per-second countdown that ends in `try_start`.
    pub fn request_start(&mut self, now: u64) -> Result<StartRequest, RejectReason> {
        if self.state.phase != Phase::Waiting {
            return Err(RejectReason::AlreadyStarted);
        }
        if self.countdown.is_some() {
            return Ok(StartRequest::AlreadyRequested);
        }
        let secs = self.config.session.countdown_secs;
        self.auto_start_at = None;
        self.countdown = Some(Countdown {
            remaining: secs,
            next_at: now + SECOND_MS,
        });
        info!("Start requested for game {}, {} s countdown", self.state.game_id, secs);
        Ok(StartRequest::Countdown(secs))
    }

    /// Fires every deadline that has passed by `now`.
    pub fn poll_timers<R: Rng + ?Sized>(
        &mut self,
        store: &mut EntityStore,
        now: u64,
        rng: &mut R,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if self.auto_start_at.is_some_and(|at| at <= now) {
            self.auto_start_at = None;
            events.extend(self.try_start(store, now));
        }

        if let Some(mut countdown) = self.countdown.filter(|c| c.next_at <= now) {
            countdown.remaining = countdown.remaining.saturating_sub(1);
            if countdown.remaining == 0 {
                self.countdown = None;
                events.extend(self.try_start(store, now));
            } else {
                countdown.next_at += SECOND_MS;
                self.countdown = Some(countdown);
                events.push(SessionEvent::Countdown {
                    remaining: countdown.remaining,
                });
            }
        }

        if self.state.phase == Phase::Playing && self.next_shrink_at.is_some_and(|at| at <= now) {
            if let (Some(zone), Some(hazard)) = (self.state.hazard.as_mut(), self.config.hazard.as_ref()) {
                self.next_shrink_at = Some(now + hazard.shrink_interval_ms);
                if rules::shrink_hazard(zone, hazard) {
                    debug!("Hazard shrunk to {}", zone.radius);
                    events.push(SessionEvent::HazardShrunk {
                        radius: zone.radius,
                    });
                }
            }
        }

        if self.reset_at.is_some_and(|at| at <= now) {
            events.push(self.reset(store, now, rng));
        }

        events
    }

    /// Spawn point for a new or respawning entity.
    pub fn spawn_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        let map = self.config.map;
        match self.config.session.spawn {
            SpawnPolicy::Fixed(point) => map.clamp(point, 0.0),
            SpawnPolicy::Random { margin } => {
                let margin_x = margin.min(map.width / 2.0);
                let margin_y = margin.min(map.height / 2.0);
                let x = if margin_x * 2.0 < map.width {
                    rng.gen_range(margin_x..map.width - margin_x)
                } else {
                    map.width / 2.0
                };
                let y = if margin_y * 2.0 < map.height {
                    rng.gen_range(margin_y..map.height - margin_y)
                } else {
                    map.height / 2.0
                };
                Vec2::new(x, y)
            }
        }
    }

    fn clear_timers(&mut self) {
        self.auto_start_at = None;
        self.countdown = None;
        self.next_shrink_at = None;
        self.reset_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (SessionCoordinator, EntityStore, StdRng) {
        (
            SessionCoordinator::new(GameConfig::battle_royale()),
            EntityStore::new(),
            StdRng::seed_from_u64(3),
        )
    }

    #[test]
    fn test_join_spawns_within_margin() {
        let (mut session, mut store, mut rng) = setup();
        for id in 1..=20 {
            let entity = session
                .join(&mut store, ConnectionId(id), None, 0, &mut rng)
                .unwrap();
            assert!(entity.position.x >= 100.0 && entity.position.x <= 1948.0);
            assert!(entity.position.y >= 100.0 && entity.position.y <= 1948.0);
        }
        assert_eq!(store.get(ConnectionId(4)).unwrap().name, "Player_4");
    }

    #[test]
    fn test_double_join_rejected() {
        let (mut session, mut store, mut rng) = setup();
        session.join(&mut store, ConnectionId(1), Some("Arthur".into()), 0, &mut rng).unwrap();
        assert_eq!(
            session.join(&mut store, ConnectionId(1), None, 0, &mut rng),
            Err(RejectReason::AlreadyJoined)
        );
        assert_eq!(store.get(ConnectionId(1)).unwrap().name, "Arthur");
    }

    #[test]
    fn test_auto_start_after_delay() {
        let (mut session, mut store, mut rng) = setup();
        session.join(&mut store, ConnectionId(1), None, 1_000, &mut rng).unwrap();
        assert!(session.auto_start_pending());

        assert!(session.poll_timers(&mut store, 2_999, &mut rng).is_empty());
        let events = session.poll_timers(&mut store, 3_000, &mut rng);

        assert_eq!(
            events,
            vec![SessionEvent::Started {
                game_id: 1,
                player_count: 1
            }]
        );
        assert_eq!(session.phase(), Phase::Playing);
        assert_eq!(session.state().started_at, Some(3_000));
    }

    #[test]
    fn test_auto_start_cancelled_when_room_empties() {
        let (mut session, mut store, mut rng) = setup();
        session.join(&mut store, ConnectionId(1), None, 0, &mut rng).unwrap();
        session.leave(&mut store, ConnectionId(1));

        assert!(!session.auto_start_pending());
        assert!(session.poll_timers(&mut store, 10_000, &mut rng).is_empty());
        assert_eq!(session.phase(), Phase::Waiting);
    }

    #[test]
    fn test_leave_absent_is_noop() {
        let (mut session, mut store, _) = setup();
        assert!(session.leave(&mut store, ConnectionId(8)).is_none());
    }

    #[test]
    fn test_mid_game_join_policy() {
        let mut config = GameConfig::battle_royale();
        config.session.allow_mid_game_join = false;
        let mut session = SessionCoordinator::new(config);
        let mut store = EntityStore::new();
        let mut rng = StdRng::seed_from_u64(1);

        session.join(&mut store, ConnectionId(1), None, 0, &mut rng).unwrap();
        session.try_start(&store, 0).unwrap();

        assert_eq!(
            session.join(&mut store, ConnectionId(2), None, 0, &mut rng),
            Err(RejectReason::GameInProgress)
        );
    }

    #[test]
    fn test_end_ranks_survivor_first_and_arms_reset() {
        let (mut session, mut store, mut rng) = setup();
        for id in 1..=3 {
            session.join(&mut store, ConnectionId(id), None, 0, &mut rng).unwrap();
        }
        session.try_start(&store, 100).unwrap();

        store.get_mut(ConnectionId(2)).unwrap().health = 0;
        let victim = store.get(ConnectionId(2)).unwrap().clone();
        let record = session
            .record_elimination(&victim, EliminationReason::Combat, 2, 200)
            .unwrap();
        assert_eq!(record.rank, 3);
        assert!(session.try_end(&store, 200).is_none());

        store.get_mut(ConnectionId(3)).unwrap().health = 0;
        let victim = store.get(ConnectionId(3)).unwrap().clone();
        session.record_elimination(&victim, EliminationReason::Storm, 1, 300);

        let summary = session.try_end(&store, 1_100).unwrap();
        assert_eq!(summary.winner, Some(ConnectionId(1)));
        assert_eq!(summary.total_players, 3);
        assert_eq!(summary.duration_ms, 1_000);
        let order: Vec<u32> = summary.rankings.iter().map(|r| r.entity_id.0).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(session.phase(), Phase::Ended);
        assert!(session.reset_pending());

        assert!(session.try_end(&store, 1_200).is_none());
    }

    #[test]
    fn test_elimination_recorded_once() {
        let (mut session, mut store, mut rng) = setup();
        let entity = session.join(&mut store, ConnectionId(1), None, 0, &mut rng).unwrap();
        assert!(session.record_elimination(&entity, EliminationReason::Combat, 0, 0).is_some());
        assert!(session.record_elimination(&entity, EliminationReason::Storm, 0, 0).is_none());
        assert_eq!(session.state().elimination_log.len(), 1);
    }

    #[test]
    fn test_reset_keeps_connected_entities() {
        let (mut session, mut store, mut rng) = setup();
        session.join(&mut store, ConnectionId(1), None, 0, &mut rng).unwrap();
        session.join(&mut store, ConnectionId(2), None, 0, &mut rng).unwrap();
        session.try_start(&store, 0).unwrap();
        store.get_mut(ConnectionId(2)).unwrap().health = 0;
        session.try_end(&store, 5_000).unwrap();

        let events = session.poll_timers(&mut store, 15_000, &mut rng);

        assert_eq!(events, vec![SessionEvent::Reset { game_id: 2 }]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(ConnectionId(2)).unwrap().health, 100);
        assert_eq!(session.phase(), Phase::Waiting);
        assert!(session.state().elimination_log.is_empty());
        assert_eq!(session.state().hazard.unwrap().radius, 1024.0);
        assert!(session.auto_start_pending());
    }

    #[test]
    fn test_requested_countdown() {
        let (mut session, mut store, mut rng) = setup();
        session.join(&mut store, ConnectionId(1), None, 0, &mut rng).unwrap();

        assert_eq!(session.request_start(0), Ok(StartRequest::Countdown(3)));
        assert!(!session.auto_start_pending());
        assert_eq!(session.request_start(10), Ok(StartRequest::AlreadyRequested));

        assert_eq!(
            session.poll_timers(&mut store, 1_000, &mut rng),
            vec![SessionEvent::Countdown { remaining: 2 }]
        );
        assert_eq!(
            session.poll_timers(&mut store, 2_000, &mut rng),
            vec![SessionEvent::Countdown { remaining: 1 }]
        );
        assert_eq!(
            session.poll_timers(&mut store, 3_000, &mut rng),
            vec![SessionEvent::Started {
                game_id: 1,
                player_count: 1
            }]
        );
        assert_eq!(session.request_start(3_500), Err(RejectReason::AlreadyStarted));
    }

    #[test]
    fn test_hazard_shrinks_on_schedule_and_never_grows() {
        let (mut session, mut store, mut rng) = setup();
        session.join(&mut store, ConnectionId(1), None, 0, &mut rng).unwrap();
        session.join(&mut store, ConnectionId(2), None, 0, &mut rng).unwrap();
        session.try_start(&store, 0).unwrap();

        let mut last = session.state().hazard.unwrap().radius;
        for step in 1..=30u64 {
            session.poll_timers(&mut store, step * 10_000, &mut rng);
            let radius = session.state().hazard.unwrap().radius;
            assert!(radius <= last);
            last = radius;
        }
        assert_eq!(last, 100.0);
    }
}
