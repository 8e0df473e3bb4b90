//! Discrete actions for energy-based modes.
//!
//! Every action kind carries its own cost, cooldown and effect, so adding a
//! kind forces every `match` over it to be revisited.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Jab,
    Hook,
    Uppercut,
    OverheadHook,
    MoveLeft,
    MoveRight,
}

/// What an action does to its performer once cost and cooldown are paid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionEffect {
    /// Strike animation; the performer's action tag is set until cooldown ends.
    Punch,
    /// Horizontal step by `dx` pixels, clamped to the map.
    Step { dx: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionSpec {
    pub energy_cost: f32,
    pub cooldown_ticks: u32,
    pub effect: ActionEffect,
}

const STEP_DISTANCE: f32 = 10.0;

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Jab,
        ActionKind::Hook,
        ActionKind::Uppercut,
        ActionKind::OverheadHook,
        ActionKind::MoveLeft,
        ActionKind::MoveRight,
    ];

    pub const fn spec(self) -> ActionSpec {
        match self {
            ActionKind::Jab => ActionSpec {
                energy_cost: 8.0,
                cooldown_ticks: 15,
                effect: ActionEffect::Punch,
            },
            ActionKind::Hook => ActionSpec {
                energy_cost: 12.0,
                cooldown_ticks: 25,
                effect: ActionEffect::Punch,
            },
            ActionKind::Uppercut => ActionSpec {
                energy_cost: 15.0,
                cooldown_ticks: 35,
                effect: ActionEffect::Punch,
            },
            ActionKind::OverheadHook => ActionSpec {
                energy_cost: 18.0,
                cooldown_ticks: 40,
                effect: ActionEffect::Punch,
            },
            ActionKind::MoveLeft => ActionSpec {
                energy_cost: 1.0,
                cooldown_ticks: 0,
                effect: ActionEffect::Step {
                    dx: -STEP_DISTANCE,
                },
            },
            ActionKind::MoveRight => ActionSpec {
                energy_cost: 1.0,
                cooldown_ticks: 0,
                effect: ActionEffect::Step { dx: STEP_DISTANCE },
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Jab => "jab",
            ActionKind::Hook => "hook",
            ActionKind::Uppercut => "uppercut",
            ActionKind::OverheadHook => "overheadHook",
            ActionKind::MoveLeft => "moveLeft",
            ActionKind::MoveRight => "moveRight",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punch_costs_increase_with_cooldown() {
        let punches: Vec<ActionSpec> = ActionKind::ALL
            .iter()
            .map(|kind| kind.spec())
            .filter(|spec| spec.effect == ActionEffect::Punch)
            .collect();

        assert_eq!(punches.len(), 4);
        for pair in punches.windows(2) {
            assert!(pair[0].energy_cost < pair[1].energy_cost);
            assert!(pair[0].cooldown_ticks < pair[1].cooldown_ticks);
        }
    }

    #[test]
    fn test_steps_have_no_cooldown() {
        assert_eq!(ActionKind::MoveLeft.spec().cooldown_ticks, 0);
        assert_eq!(
            ActionKind::MoveRight.spec().effect,
            ActionEffect::Step { dx: 10.0 }
        );
    }

    #[test]
    fn test_action_names_match_wire_names() {
        for kind in ActionKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }
}
