//! Client-side prediction, reconciliation and remote interpolation

use log::debug;
use shared::config::{GameConfig, GameMode, MovementConfig};
use shared::entity::{ConnectionId, Entity};
use shared::math::{MapBounds, Vec2};
use shared::protocol::{EntitySnapshot, MovementInput, WorldSnapshot};
use shared::rules::apply_movement_input;
use std::collections::{BTreeMap, VecDeque};

/// Tunables for prediction and smoothing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorSettings {
    /// Distance in pixels above which the shadow snaps to the server
    pub correction_threshold: f32,
    /// Fraction of the remaining gap closed per render frame
    pub interpolation: f32,
    /// Pending inputs kept for replay; the oldest is dropped when full
    pub capacity: usize,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            correction_threshold: 5.0,
            interpolation: 0.1,
            capacity: 64,
        }
    }
}

/// What a call to [`ClientPredictor::reconcile`] did to the own entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// The snapshot does not contain our entity
    Absent,
    /// First sight of our entity; the shadow was created from it
    Adopted,
    /// Shadow stayed within the threshold
    InSync { distance: f32 },
    /// Shadow snapped to the server and the pending inputs were replayed
    Corrected { distance: f32, replayed: usize },
}

/// A non-owned entity: the latest server copy plus where we draw it
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub latest: EntitySnapshot,
    pub rendered: Vec2,
}

pub struct ClientPredictor {
    own_id: Option<ConnectionId>,
    movement: Option<MovementConfig>,
    bounds: MapBounds,
    settings: PredictorSettings,
    shadow: Option<Entity>,
    pending: VecDeque<MovementInput>,
    remotes: BTreeMap<ConnectionId, RemoteEntity>,
    corrections: u64,
}

impl ClientPredictor {
    pub fn new(movement: Option<MovementConfig>, bounds: MapBounds, settings: PredictorSettings) -> Self {
        Self {
            own_id: None,
            movement,
            bounds,
            settings,
            shadow: None,
            pending: VecDeque::with_capacity(settings.capacity),
            remotes: BTreeMap::new(),
            corrections: 0,
        }
    }

    /// Predictor using the movement preset of `mode` on the given map
    pub fn for_mode(mode: GameMode, bounds: MapBounds, settings: PredictorSettings) -> Self {
        Self::new(GameConfig::for_mode(mode).movement, bounds, settings)
    }

    pub fn set_own_id(&mut self, id: ConnectionId) {
        self.own_id = Some(id);
        self.remotes.remove(&id);
    }

    pub fn own_id(&self) -> Option<ConnectionId> {
        self.own_id
    }

    /// Predicts `input` on the shadow and queues it for replay.
    ///
    /// Returns false when there is nothing to predict: no own entity yet, a
    /// mode without free movement, or a sequence that is not newer than the
    /// last queued one.
    pub fn apply_local_input(&mut self, input: MovementInput) -> bool {
        let (Some(shadow), Some(movement)) = (self.shadow.as_mut(), self.movement.as_ref()) else {
            return false;
        };
        if self
            .pending
            .back()
            .map_or(false, |last| input.sequence <= last.sequence)
        {
            return false;
        }

        apply_movement_input(shadow, &input, movement, &self.bounds);
        if self.pending.len() >= self.settings.capacity {
            self.pending.pop_front();
        }
        self.pending.push_back(input);
        true
    }

    /// Conforms to an authoritative snapshot.
    ///
    /// Acknowledged inputs leave the queue. If the shadow has drifted further
    /// than the threshold it snaps to the server position and every input
    /// still pending is replayed on top, oldest first.
    pub fn reconcile(&mut self, snapshot: &WorldSnapshot) -> Reconciliation {
        self.update_remotes(snapshot);

        let Some(server) = self.own_id.and_then(|id| snapshot.entity(id)) else {
            self.shadow = None;
            self.pending.clear();
            return Reconciliation::Absent;
        };

        let acked = server.last_processed_input;
        self.pending.retain(|input| input.sequence > acked);

        let shadow = match self.shadow.as_mut() {
            Some(shadow) => shadow,
            None => {
                self.shadow = Some(entity_from_snapshot(server));
                return Reconciliation::Adopted;
            }
        };

        let Some(movement) = self.movement.as_ref() else {
            // Nothing is predicted in this mode; mirror the server.
            let distance = shadow.position.distance(&server.position);
            *shadow = entity_from_snapshot(server);
            return Reconciliation::InSync { distance };
        };

        copy_authoritative_fields(shadow, server);
        let distance = shadow.position.distance(&server.position);
        if distance <= self.settings.correction_threshold {
            return Reconciliation::InSync { distance };
        }

        debug!("Rollback needed! Distance: {:.2}", distance);
        shadow.position = server.position;
        shadow.direction = server.direction;
        for input in &self.pending {
            apply_movement_input(shadow, input, movement, &self.bounds);
        }
        self.corrections += 1;
        Reconciliation::Corrected {
            distance,
            replayed: self.pending.len(),
        }
    }

    fn update_remotes(&mut self, snapshot: &WorldSnapshot) {
        let own_id = self.own_id;
        self.remotes.retain(|id, _| snapshot.entity(*id).is_some());

        for entity in snapshot.entities.iter().filter(|e| Some(e.id) != own_id) {
            self.remotes
                .entry(entity.id)
                .and_modify(|remote| remote.latest = entity.clone())
                .or_insert_with(|| RemoteEntity {
                    latest: entity.clone(),
                    rendered: entity.position,
                });
        }
    }

    /// Moves every remote a fixed fraction towards its latest position.
    pub fn interpolate(&mut self) {
        let alpha = self.settings.interpolation;
        for remote in self.remotes.values_mut() {
            remote.rendered = remote.rendered.lerp(&remote.latest.position, alpha);
        }
    }

    /// Drops a remote that left before the next snapshot arrived.
    pub fn forget(&mut self, id: ConnectionId) {
        self.remotes.remove(&id);
    }

    pub fn own(&self) -> Option<&Entity> {
        self.shadow.as_ref()
    }

    pub fn remote(&self, id: ConnectionId) -> Option<&RemoteEntity> {
        self.remotes.get(&id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.remotes.values()
    }

    /// Where every known entity is drawn this frame.
    pub fn positions(&self) -> BTreeMap<ConnectionId, Vec2> {
        let mut positions: BTreeMap<ConnectionId, Vec2> = self
            .remotes
            .iter()
            .map(|(id, remote)| (*id, remote.rendered))
            .collect();
        if let Some(shadow) = &self.shadow {
            positions.insert(shadow.id, shadow.position);
        }
        positions
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    pub fn bounds(&self) -> MapBounds {
        self.bounds
    }
}

/// Local mirror of a server entity. Fields the snapshot omits keep defaults.
pub fn entity_from_snapshot(snapshot: &EntitySnapshot) -> Entity {
    let mut entity = Entity::new(
        snapshot.id,
        snapshot.name.clone(),
        snapshot.position,
        snapshot.max_health,
        0,
    );
    entity.direction = snapshot.direction;
    entity.moving = snapshot.moving;
    entity.last_processed_input = snapshot.last_processed_input;
    copy_authoritative_fields(&mut entity, snapshot);
    entity
}

fn copy_authoritative_fields(entity: &mut Entity, snapshot: &EntitySnapshot) {
    entity.health = snapshot.health;
    entity.max_health = snapshot.max_health;
    entity.cooldown = snapshot.cooldown;
    entity.action = snapshot.action;
    entity.energy = snapshot.energy;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::entity::{ActionTag, Direction, EntityState};
    use shared::session::Phase;

    fn predictor() -> ClientPredictor {
        let mut predictor = ClientPredictor::for_mode(
            GameMode::BattleRoyale,
            MapBounds::new(2048.0, 2048.0),
            PredictorSettings::default(),
        );
        predictor.set_own_id(ConnectionId(1));
        predictor
    }

    fn entity(id: u32, x: f32, y: f32, last_processed_input: u32) -> EntitySnapshot {
        EntitySnapshot {
            id: ConnectionId(id),
            name: format!("Player_{}", id),
            position: Vec2::new(x, y),
            direction: Direction::Down,
            moving: false,
            state: EntityState::Idle,
            action: ActionTag::Idle,
            health: 100,
            max_health: 100,
            cooldown: 0,
            energy: None,
            velocity: None,
            last_processed_input,
        }
    }

    fn snapshot(entities: Vec<EntitySnapshot>) -> WorldSnapshot {
        WorldSnapshot {
            mode: GameMode::BattleRoyale,
            game_id: 1,
            phase: Phase::Playing,
            tick: 1,
            timestamp: 0,
            started_at: None,
            alive_count: entities.len(),
            entities,
            hazard: None,
        }
    }

    fn right(sequence: u32) -> MovementInput {
        MovementInput {
            movement: Vec2::new(1.0, 0.0),
            direction: None,
            sequence,
        }
    }

    #[test]
    fn test_input_before_adoption_is_ignored() {
        let mut predictor = predictor();
        assert!(!predictor.apply_local_input(right(1)));
        assert_eq!(predictor.pending_len(), 0);
    }

    #[test]
    fn test_local_input_moves_shadow_immediately() {
        let mut predictor = predictor();
        assert_eq!(
            predictor.reconcile(&snapshot(vec![entity(1, 100.0, 100.0, 0)])),
            Reconciliation::Adopted
        );

        assert!(predictor.apply_local_input(right(1)));
        let own = predictor.own().unwrap();
        // 200 px/s at the 1/60 s input step
        assert_approx_eq!(own.position.x, 100.0 + 200.0 / 60.0, 1e-3);
        assert_eq!(own.direction, Direction::Right);
        assert_eq!(predictor.pending_len(), 1);
    }

    #[test]
    fn test_stale_local_sequence_is_refused() {
        let mut predictor = predictor();
        predictor.reconcile(&snapshot(vec![entity(1, 100.0, 100.0, 0)]));
        assert!(predictor.apply_local_input(right(2)));
        assert!(!predictor.apply_local_input(right(2)));
        assert!(!predictor.apply_local_input(right(1)));
        assert_eq!(predictor.pending_len(), 1);
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let mut predictor = ClientPredictor::for_mode(
            GameMode::BattleRoyale,
            MapBounds::new(2048.0, 2048.0),
            PredictorSettings {
                capacity: 3,
                ..PredictorSettings::default()
            },
        );
        predictor.set_own_id(ConnectionId(1));
        predictor.reconcile(&snapshot(vec![entity(1, 100.0, 100.0, 0)]));

        for sequence in 1..=5 {
            predictor.apply_local_input(right(sequence));
        }
        assert_eq!(predictor.pending_len(), 3);
        let sequences: Vec<u32> = predictor.pending.iter().map(|i| i.sequence).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
    }

    #[test]
    fn test_small_divergence_is_tolerated() {
        let mut predictor = predictor();
        predictor.reconcile(&snapshot(vec![entity(1, 100.0, 100.0, 0)]));
        predictor.apply_local_input(right(1));

        let result = predictor.reconcile(&snapshot(vec![entity(1, 101.0, 100.0, 0)]));
        match result {
            Reconciliation::InSync { distance } => assert!(distance < 5.0),
            other => panic!("Unexpected reconciliation {:?}", other),
        }
        assert_eq!(predictor.pending_len(), 1);
        assert_eq!(predictor.corrections(), 0);
    }

    #[test]
    fn test_divergence_snaps_and_replays_pending() {
        let mut predictor = predictor();
        predictor.reconcile(&snapshot(vec![entity(1, 100.0, 100.0, 0)]));
        for sequence in 1..=3 {
            predictor.apply_local_input(right(sequence));
        }

        // Server processed input 1 but saw us at a very different spot.
        let result = predictor.reconcile(&snapshot(vec![entity(1, 300.0, 100.0, 1)]));

        match result {
            Reconciliation::Corrected { replayed, .. } => assert_eq!(replayed, 2),
            other => panic!("Unexpected reconciliation {:?}", other),
        }
        let own = predictor.own().unwrap();
        assert_approx_eq!(own.position.x, 300.0 + 2.0 * 200.0 / 60.0, 1e-3);
        assert_eq!(predictor.pending_len(), 2);
        assert_eq!(predictor.corrections(), 1);
    }

    #[test]
    fn test_unacked_drift_past_threshold_snaps_and_replays() {
        let mut predictor = predictor();
        predictor.reconcile(&snapshot(vec![entity(1, 100.0, 100.0, 0)]));
        for sequence in 1..=3 {
            predictor.apply_local_input(right(sequence));
        }
        assert_approx_eq!(predictor.own().unwrap().position.x, 110.0, 1e-3);

        // Nothing acknowledged yet and the server is 9px behind the shadow.
        let result = predictor.reconcile(&snapshot(vec![entity(1, 101.0, 100.0, 0)]));

        match result {
            Reconciliation::Corrected { distance, replayed } => {
                assert_approx_eq!(distance, 9.0, 1e-3);
                assert_eq!(replayed, 3);
            }
            other => panic!("Unexpected reconciliation {:?}", other),
        }
        assert_approx_eq!(predictor.own().unwrap().position.x, 111.0, 1e-3);
        assert_eq!(predictor.pending_len(), 3);
    }

    #[test]
    fn test_missing_own_entity_clears_shadow() {
        let mut predictor = predictor();
        predictor.reconcile(&snapshot(vec![entity(1, 100.0, 100.0, 0)]));
        predictor.apply_local_input(right(1));

        assert_eq!(predictor.reconcile(&snapshot(vec![])), Reconciliation::Absent);
        assert!(predictor.own().is_none());
        assert_eq!(predictor.pending_len(), 0);
    }

    #[test]
    fn test_remotes_interpolate_without_snapping() {
        let mut predictor = predictor();
        predictor.reconcile(&snapshot(vec![entity(1, 0.0, 0.0, 0), entity(2, 100.0, 100.0, 0)]));
        assert_eq!(predictor.remote(ConnectionId(2)).unwrap().rendered, Vec2::new(100.0, 100.0));

        predictor.reconcile(&snapshot(vec![entity(1, 0.0, 0.0, 0), entity(2, 200.0, 100.0, 0)]));
        assert_eq!(predictor.remote(ConnectionId(2)).unwrap().rendered.x, 100.0);

        predictor.interpolate();
        assert_approx_eq!(predictor.remote(ConnectionId(2)).unwrap().rendered.x, 110.0, 1e-4);
        predictor.interpolate();
        assert_approx_eq!(predictor.remote(ConnectionId(2)).unwrap().rendered.x, 119.0, 1e-4);
    }

    #[test]
    fn test_departed_remotes_are_removed() {
        let mut predictor = predictor();
        predictor.reconcile(&snapshot(vec![entity(2, 1.0, 1.0, 0), entity(3, 2.0, 2.0, 0)]));
        assert_eq!(predictor.remotes().count(), 2);

        predictor.reconcile(&snapshot(vec![entity(3, 2.0, 2.0, 0)]));
        assert!(predictor.remote(ConnectionId(2)).is_none());

        predictor.forget(ConnectionId(3));
        assert_eq!(predictor.remotes().count(), 0);
    }

    #[test]
    fn test_modes_without_movement_only_mirror() {
        let mut predictor = ClientPredictor::for_mode(
            GameMode::Physics,
            MapBounds::new(600.0, 400.0),
            PredictorSettings::default(),
        );
        predictor.set_own_id(ConnectionId(1));
        predictor.reconcile(&snapshot(vec![entity(1, 10.0, 10.0, 0)]));
        assert!(!predictor.apply_local_input(right(1)));
        assert_eq!(predictor.own().unwrap().position, Vec2::new(10.0, 10.0));

        predictor.reconcile(&snapshot(vec![entity(1, 12.0, 10.0, 0)]));
        assert_eq!(predictor.own().unwrap().position, Vec2::new(12.0, 10.0));
        assert_eq!(predictor.corrections(), 0);
    }
}
