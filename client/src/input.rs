//! Client input management with sequencing and change detection

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::entity::Direction;
use shared::math::Vec2;
use shared::protocol::MovementInput;
use std::time::{Duration, Instant};

/// Turns movement samples into sequenced inputs for the network
pub struct InputManager {
    next_sequence: u32,
    current_movement: Vec2,
    last_input_sent: Option<Instant>,
    keep_alive: Duration,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            current_movement: Vec2::ZERO,
            last_input_sent: None,
            keep_alive: Duration::from_millis(16),
        }
    }

    /// Returns an input to send when the movement changed or the keep-alive
    /// interval has passed since the last one.
    pub fn update(&mut self, movement: Vec2) -> Option<MovementInput> {
        self.update_at(movement, Instant::now())
    }

    fn update_at(&mut self, movement: Vec2, now: Instant) -> Option<MovementInput> {
        let input_changed = movement != self.current_movement;
        let time_to_send = self
            .last_input_sent
            .map_or(true, |sent| now.duration_since(sent) >= self.keep_alive);
        if !input_changed && !time_to_send {
            return None;
        }

        let input = MovementInput {
            movement,
            direction: (!movement.is_zero()).then(|| Direction::towards(Vec2::ZERO, movement)),
            sequence: self.next_sequence,
        };
        self.current_movement = movement;
        self.next_sequence += 1;
        self.last_input_sent = Some(now);
        Some(input)
    }

    /// Returns the movement most recently turned into an input
    pub fn current_movement(&self) -> Vec2 {
        self.current_movement
    }

    /// Sequence the next input will carry
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Scripted stand-in for a player: walks in a random compass direction,
/// sometimes pausing, and picks a new heading every so often.
pub struct WanderPattern {
    rng: StdRng,
    heading: Vec2,
    remaining: u32,
    min_steps: u32,
    max_steps: u32,
}

impl WanderPattern {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            heading: Vec2::ZERO,
            remaining: 0,
            min_steps: 30,
            max_steps: 120,
        }
    }

    /// Movement for the next input step
    pub fn sample(&mut self) -> Vec2 {
        if self.remaining == 0 {
            self.heading = match self.rng.gen_range(0..9) {
                0 => Vec2::ZERO,
                n => {
                    let angle = (n - 1) as f32 * std::f32::consts::FRAC_PI_4;
                    Vec2::new(angle.cos(), angle.sin()).rounded()
                }
            };
            self.remaining = self.rng.gen_range(self.min_steps..=self.max_steps);
        }
        self.remaining -= 1;
        self.heading
    }

    /// Random point inside `[0, width) x [0, height)`
    pub fn point(&mut self, width: f32, height: f32) -> Vec2 {
        Vec2::new(
            self.rng.gen_range(0.0..width.max(1.0)),
            self.rng.gen_range(0.0..height.max(1.0)),
        )
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
