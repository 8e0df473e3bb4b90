//! Pure update rules over entities and session values.
//!
//! Nothing here performs I/O or reads a clock. Discrete rules report
//! failures as a [`RejectReason`] that the gateway forwards to the sender;
//! continuous rules return a [`RuleError`] when an entity ends up in a state
//! the caller must roll back.

use crate::action::{ActionEffect, ActionKind, ActionSpec};
use crate::config::{CombatConfig, EnergyConfig, GameConfig, HazardConfig, MovementConfig, PhysicsConfig};
use crate::entity::{ActionTag, ConnectionId, Direction, Entity};
use crate::math::{MapBounds, Vec2};
use crate::protocol::{MovementInput, RejectReason};
use crate::session::{EliminationReason, HazardZone, Phase};
use crate::store::EntityStore;
use crate::tiles::{tile_of, TileMap};
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("entity {0} reached a non-finite state")]
    NonFinite(ConnectionId),
}

/// Damage dealt to one entity by a single rule application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub target: ConnectionId,
    pub damage: u32,
    pub remaining: u32,
    /// True only for the hit that took health from positive to zero.
    pub eliminated: bool,
    /// Live entities left right after this hit was applied.
    pub alive_after: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttackOutcome {
    pub hits: Vec<Hit>,
}

impl AttackOutcome {
    pub fn eliminations(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter().filter(|hit| hit.eliminated)
    }
}

/// Per-tick inputs shared by every entity's continuous update.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub config: &'a GameConfig,
    pub phase: Phase,
    pub hazard: Option<HazardZone>,
    pub dt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContinuousOutcome {
    pub damage: u32,
    pub eliminated: Option<EliminationReason>,
}

/// Integrates one movement sample into the entity.
///
/// The movement vector is capped at unit length, scaled by speed and the
/// fixed input step, and the result is clamped to the map. The recorded
/// sequence only ever grows.
pub fn apply_movement_input(
    entity: &mut Entity,
    input: &MovementInput,
    config: &MovementConfig,
    bounds: &MapBounds,
) {
    let movement = if input.movement.magnitude() > 1.0 {
        input.movement.normalize()
    } else {
        input.movement
    };

    let step = movement.scale(config.speed * config.input_dt);
    entity.position = bounds.clamp(entity.position.add(&step), entity.extent());
    entity.moving = !movement.is_zero();
    if let Some(direction) = input.direction {
        entity.direction = direction;
    } else if entity.moving {
        entity.direction = Direction::towards(Vec2::ZERO, movement);
    }
    entity.last_processed_input = entity.last_processed_input.max(input.sequence);
}

/// Hits every other live entity within range of the attacker.
///
/// Targets are visited in ascending id order. Damage saturates at zero, and
/// dead entities are never hit again, so repeating an attack on an
/// eliminated target changes nothing.
pub fn apply_attack(
    store: &mut EntityStore,
    attacker_id: ConnectionId,
    aim: Vec2,
    config: &CombatConfig,
) -> Result<AttackOutcome, RejectReason> {
    let attacker = store.get(attacker_id).ok_or(RejectReason::NotJoined)?;
    if !attacker.is_alive() {
        return Err(RejectReason::Eliminated);
    }
    if attacker.cooldown > 0 {
        return Err(RejectReason::OnCooldown);
    }
    let origin = attacker.position;

    let targets: Vec<ConnectionId> = store
        .iter()
        .filter(|e| e.id != attacker_id && e.is_alive())
        .filter(|e| e.position.distance(&origin) <= config.range)
        .map(|e| e.id)
        .collect();

    if let Some(attacker) = store.get_mut(attacker_id) {
        attacker.cooldown = config.cooldown_ticks;
        attacker.action = ActionTag::Attacking;
        if aim.is_finite() && aim != origin {
            attacker.direction = Direction::towards(origin, aim);
        }
    }

    let mut outcome = AttackOutcome::default();
    for target in targets {
        if let Some(hit) = damage_entity(store, target, config.damage) {
            outcome.hits.push(hit);
        }
    }
    Ok(outcome)
}

fn damage_entity(store: &mut EntityStore, id: ConnectionId, damage: u32) -> Option<Hit> {
    let entity = store.get_mut(id)?;
    if !entity.is_alive() {
        return None;
    }
    let before = entity.health;
    entity.health = entity.health.saturating_sub(damage);
    let remaining = entity.health;
    if remaining == 0 {
        entity.moving = false;
        entity.path.clear();
    }
    Some(Hit {
        target: id,
        damage: before - remaining,
        remaining,
        eliminated: remaining == 0,
        alive_after: store.alive_count(),
    })
}

/// Performs a discrete action, paying its energy cost up front.
pub fn apply_action(
    entity: &mut Entity,
    kind: ActionKind,
    bounds: &MapBounds,
) -> Result<ActionSpec, RejectReason> {
    let spec = kind.spec();
    if !entity.is_alive() {
        return Err(RejectReason::Eliminated);
    }
    let energy = entity.energy.ok_or(RejectReason::Unsupported)?;
    if entity.cooldown > 0 {
        return Err(RejectReason::OnCooldown);
    }
    if energy < spec.energy_cost {
        return Err(RejectReason::InsufficientEnergy);
    }

    entity.energy = Some(energy - spec.energy_cost);
    entity.cooldown = spec.cooldown_ticks;
    match spec.effect {
        ActionEffect::Punch => entity.action = ActionTag::Performing(kind),
        ActionEffect::Step { dx } => {
            let target = entity.position.add(&Vec2::new(dx, 0.0));
            entity.position = bounds.clamp(target, entity.extent());
            entity.direction = if dx < 0.0 {
                Direction::Left
            } else {
                Direction::Right
            };
        }
    }
    Ok(spec)
}

/// Adds an instantaneous velocity change of `force / mass`.
pub fn apply_force(entity: &mut Entity, force: Vec2) -> Result<(), RejectReason> {
    if !force.is_finite() {
        return Err(RejectReason::InvalidInput);
    }
    let body = entity.body.as_mut().ok_or(RejectReason::Unsupported)?;
    if body.mass <= 0.0 {
        return Err(RejectReason::Unsupported);
    }
    body.velocity = body.velocity.add(&force.scale(1.0 / body.mass));
    Ok(())
}

/// Queues a walk to a tile target; the tick consumes one step at a time.
///
/// Returns the number of steps queued. The path may stop short of the
/// target when the greedy walk is blocked.
pub fn request_path(
    entity: &mut Entity,
    tiles: &TileMap,
    target: (u32, u32),
    max_len: usize,
) -> Result<usize, RejectReason> {
    if !entity.is_alive() {
        return Err(RejectReason::Eliminated);
    }
    let target = (i64::from(target.0), i64::from(target.1));
    if !tiles.is_walkable(target.0, target.1) {
        return Err(RejectReason::Unwalkable);
    }
    let start = tile_of(entity.position);
    if start == target {
        entity.path.clear();
        return Ok(0);
    }
    let path = tiles.find_path(start, target, max_len);
    if path.is_empty() {
        return Err(RejectReason::NoPath);
    }
    entity.path = path
        .into_iter()
        .map(|(x, y)| Vec2::new(x as f32, y as f32))
        .collect();
    Ok(entity.path.len())
}

/// Advances one entity by one tick.
///
/// Covers energy regeneration, cooldown decay, probabilistic hazard damage,
/// body integration against the map walls and path stepping. A
/// non-finite result is reported so the caller can restore the entity.
pub fn apply_continuous_rules<R: Rng + ?Sized>(
    entity: &mut Entity,
    ctx: &TickContext<'_>,
    rng: &mut R,
) -> Result<ContinuousOutcome, RuleError> {
    let config = ctx.config;
    let mut outcome = ContinuousOutcome::default();

    if let (Some(energy_cfg), Some(energy)) = (config.energy.as_ref(), entity.energy) {
        entity.energy = Some(regenerate(energy, energy_cfg));
    }

    if entity.cooldown > 0 {
        entity.cooldown -= 1;
        if entity.cooldown == 0 {
            entity.action = ActionTag::Idle;
        }
    }

    if let (Some(zone), Some(hazard_cfg)) = (ctx.hazard, config.hazard.as_ref()) {
        if ctx.phase == Phase::Playing && entity.is_alive() && !zone.contains(entity.position) {
            outcome = hazard_tick(entity, hazard_cfg, rng);
        }
    }

    if let Some(physics) = config.physics.as_ref() {
        integrate_body(entity, physics, &config.map, ctx.dt);
    }

    if config.tiles.is_some() && entity.is_alive() {
        match entity.path.pop_front() {
            Some(next) => {
                entity.direction = Direction::towards(entity.position, next);
                entity.position = config.map.clamp(next, 0.0);
                entity.moving = true;
            }
            None => entity.moving = false,
        }
    }

    if !entity.is_finite() {
        return Err(RuleError::NonFinite(entity.id));
    }
    Ok(outcome)
}

fn regenerate(energy: f32, config: &EnergyConfig) -> f32 {
    (energy + config.regen_per_tick).min(config.max)
}

fn hazard_tick<R: Rng + ?Sized>(
    entity: &mut Entity,
    config: &HazardConfig,
    rng: &mut R,
) -> ContinuousOutcome {
    let mut outcome = ContinuousOutcome::default();
    if config.tick_damage_probability <= 0.0 || !rng.gen_bool(config.tick_damage_probability.min(1.0)) {
        return outcome;
    }
    let before = entity.health;
    entity.health = entity.health.saturating_sub(config.tick_damage);
    outcome.damage = before - entity.health;
    if before > 0 && entity.health == 0 {
        entity.moving = false;
        outcome.eliminated = Some(EliminationReason::Storm);
    }
    outcome
}

fn integrate_body(entity: &mut Entity, config: &PhysicsConfig, bounds: &MapBounds, dt: f32) {
    let Some(body) = entity.body.as_mut() else {
        return;
    };
    let radius = body.radius;

    body.velocity.y += config.gravity * dt;
    let mut position = entity.position.add(&body.velocity.scale(dt));

    if position.x - radius < 0.0 {
        position.x = radius;
        body.velocity.x = -body.velocity.x * config.wall_restitution;
    } else if position.x + radius > bounds.width {
        position.x = bounds.width - radius;
        body.velocity.x = -body.velocity.x * config.wall_restitution;
    }

    if position.y - radius < 0.0 {
        position.y = radius;
        body.velocity.y = -body.velocity.y * config.wall_restitution;
    } else if position.y + radius > bounds.height {
        position.y = bounds.height - radius;
        body.velocity.y = -body.velocity.y * config.wall_restitution;
        body.velocity.x *= config.floor_friction;
    }

    entity.moving = !body.velocity.is_zero();
    entity.position = bounds.clamp(position, radius);
}

/// Resolves one overlapping pair of circular bodies.
///
/// Pushes the pair apart along the contact normal, then exchanges the
/// impulse `(1 + e) * vn / (m1 + m2)` scaled by the partner's mass. Pairs
/// already separating along the normal keep their velocities. Returns true
/// when the bodies were touching.
pub fn resolve_elastic_collision(
    a: &mut Entity,
    b: &mut Entity,
    restitution: f32,
    bounds: &MapBounds,
) -> bool {
    let (Some(body_a), Some(body_b)) = (a.body, b.body) else {
        return false;
    };

    let delta = b.position.sub(&a.position);
    let distance = delta.magnitude();
    let min_distance = body_a.radius + body_b.radius;
    if distance >= min_distance {
        return false;
    }

    let normal = if distance > f32::EPSILON {
        delta.scale(1.0 / distance)
    } else {
        Vec2::new(1.0, 0.0)
    };

    let overlap = min_distance - distance;
    let separation = normal.scale(overlap / 2.0);
    a.position = bounds.clamp(a.position.sub(&separation), body_a.radius);
    b.position = bounds.clamp(b.position.add(&separation), body_b.radius);

    let relative = body_b.velocity.sub(&body_a.velocity);
    let normal_velocity = relative.dot(&normal);
    if normal_velocity > 0.0 {
        return true;
    }

    let total_mass = body_a.mass + body_b.mass;
    if total_mass <= 0.0 {
        return true;
    }
    let impulse = (1.0 + restitution) * normal_velocity / total_mass;

    if let Some(body) = a.body.as_mut() {
        body.velocity = body.velocity.add(&normal.scale(impulse * body_b.mass));
    }
    if let Some(body) = b.body.as_mut() {
        body.velocity = body.velocity.sub(&normal.scale(impulse * body_a.mass));
    }
    true
}

/// Resolves every touching pair once, in ascending id order.
pub fn apply_collisions(store: &mut EntityStore, config: &PhysicsConfig, bounds: &MapBounds) -> usize {
    let ids = store.ids();
    let mut contacts = 0;
    for (i, &first) in ids.iter().enumerate() {
        for &second in &ids[i + 1..] {
            if let Some((a, b)) = store.pair_mut(first, second) {
                if resolve_elastic_collision(a, b, config.collision_restitution, bounds) {
                    contacts += 1;
                }
            }
        }
    }
    contacts
}

/// Shrinks the zone by one step without going below the minimum radius.
/// Returns false when the zone was already at its minimum.
pub fn shrink_hazard(zone: &mut HazardZone, config: &HazardConfig) -> bool {
    let next = (zone.radius - config.shrink_step).max(config.min_radius);
    if next < zone.radius {
        zone.radius = next;
        true
    } else {
        false
    }
}

/// Deals the one-off shrink damage to every live entity outside the zone.
pub fn apply_shrink_damage(store: &mut EntityStore, zone: &HazardZone, damage: u32) -> Vec<Hit> {
    let outside: Vec<ConnectionId> = store
        .iter()
        .filter(|e| e.is_alive() && !zone.contains(e.position))
        .map(|e| e.id)
        .collect();
    outside
        .into_iter()
        .filter_map(|id| damage_entity(store, id, damage))
        .collect()
}

pub fn check_end_condition(phase: Phase, store: &EntityStore) -> bool {
    phase == Phase::Playing && store.alive_count() <= 1
}
