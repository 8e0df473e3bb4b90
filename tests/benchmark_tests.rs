//! Performance benchmarks for critical game systems

use client::predictor::{ClientPredictor, PredictorSettings};
use server::game::GameWorld;
use shared::config::{GameConfig, GameMode};
use shared::entity::{Body, ConnectionId, Entity};
use shared::math::{MapBounds, Vec2};
use shared::protocol::{self, MovementInput, ServerMessage, WireFormat};
use shared::rules;
use std::time::Instant;

/// Benchmarks pairwise collision resolution
#[test]
fn benchmark_collision_resolution() {
    let bounds = MapBounds::new(600.0, 400.0);
    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut a = Entity::new(ConnectionId(1), "A", Vec2::new(100.0, 100.0), 100, 0)
            .with_body(Body::new(20.0, 1.0));
        let mut b = Entity::new(ConnectionId(2), "B", Vec2::new(130.0, 100.0), 100, 0)
            .with_body(Body::new(20.0, 1.0));
        if let Some(body) = a.body.as_mut() {
            body.velocity = Vec2::new(200.0, 0.0);
        }

        rules::resolve_elastic_collision(&mut a, &mut b, 1.0, &bounds);
    }

    let duration = start.elapsed();
    println!(
        "Collision resolution: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks a crowded physics room, where every tick checks all pairs
#[test]
fn benchmark_physics_room_tick() {
    let mut config = GameConfig::physics();
    config.rng_seed = Some(1);
    let mut world = GameWorld::new(config);
    for id in 1..=50 {
        world.join(ConnectionId(id), None, 0).unwrap();
    }

    let iterations = 600;
    let start = Instant::now();
    for step in 1..=iterations {
        world.tick(step * 16);
    }

    let duration = start.elapsed();
    println!(
        "Physics room, 50 bodies: {} ticks in {:?} ({:.2} μs/tick)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Ten seconds of simulated time should take well under two real ones
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks a battle royale tick with a full lobby
#[test]
fn benchmark_battle_royale_tick() {
    let mut config = GameConfig::battle_royale();
    config.rng_seed = Some(2);
    let mut world = GameWorld::new(config);
    for id in 1..=64 {
        world.join(ConnectionId(id), None, 0).unwrap();
    }
    world.tick(2_000);

    let iterations = 1_000u64;
    let start = Instant::now();
    for step in 1..=iterations {
        for id in 1..=64u32 {
            let input = MovementInput {
                movement: Vec2::new(1.0, 0.0),
                direction: None,
                sequence: step as u32,
            };
            let _ = world.apply_input(ConnectionId(id), &input);
        }
        world.tick(2_000 + step * 16);
    }

    let duration = start.elapsed();
    println!(
        "Battle royale, 64 players: {} ticks in {:?} ({:.2} μs/tick)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

/// Compares snapshot encoding cost and size across both codecs
#[test]
fn benchmark_snapshot_encoding() {
    let mut config = GameConfig::battle_royale();
    config.rng_seed = Some(3);
    let mut world = GameWorld::new(config);
    for id in 1..=64 {
        world.join(ConnectionId(id), None, 0).unwrap();
    }
    let message = ServerMessage::Snapshot(world.snapshot(0));
    let iterations = 1_000;

    let mut sizes = Vec::new();
    for format in [WireFormat::Json, WireFormat::Binary] {
        let start = Instant::now();
        let mut size = 0;
        for _ in 0..iterations {
            size = protocol::encode(&message, format).unwrap().len();
        }
        let duration = start.elapsed();
        println!(
            "Snapshot encoding ({:?}): {} bytes, {} iterations in {:?} ({:.2} μs/iter)",
            format,
            size,
            iterations,
            duration,
            duration.as_micros() as f64 / iterations as f64
        );
        sizes.push(size);
        assert!(duration.as_millis() < 2000);
    }

    // Binary frames should be the compact option
    assert!(sizes[1] < sizes[0]);
}

/// Benchmarks reconciliation with a full replay queue
#[test]
fn benchmark_prediction_replay() {
    let mut config = GameConfig::battle_royale();
    config.rng_seed = Some(4);
    let mut world = GameWorld::new(config);
    world.join(ConnectionId(1), None, 0).unwrap();
    world.tick(2_000);

    let mut predictor = ClientPredictor::for_mode(
        GameMode::BattleRoyale,
        world.config().map,
        PredictorSettings::default(),
    );
    predictor.set_own_id(ConnectionId(1));
    predictor.reconcile(&world.snapshot(2_000));

    // The server never acknowledges anything, so every reconcile replays
    // the whole queue.
    for sequence in 1..=64 {
        predictor.apply_local_input(MovementInput {
            movement: Vec2::new(0.5, 0.5),
            direction: None,
            sequence,
        });
    }
    let snapshot = world.snapshot(2_016);

    let iterations = 10_000;
    let start = Instant::now();
    for _ in 0..iterations {
        predictor.reconcile(&snapshot);
    }

    let duration = start.elapsed();
    println!(
        "Reconciliation with {} pending: {} iterations in {:?} ({:.2} μs/iter)",
        predictor.pending_len(),
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(predictor.pending_len(), 64);
    assert!(duration.as_millis() < 2000);
}
