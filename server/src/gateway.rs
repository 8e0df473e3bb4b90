//! Translation between client messages and world operations.
//!
//! Each handler validates the sender, delegates to the [`GameWorld`], and
//! turns the result into outbound messages with their fan-out. The gateway
//! keeps no state of its own.

use crate::game::{eliminated_message, CombatReport, GameWorld};
use crate::outbound::Outbound;
use crate::session::StartRequest;
use log::{debug, warn};
use shared::entity::ConnectionId;
use shared::math::Vec2;
use shared::protocol::{ClientMessage, RejectReason, RequestKind, ServerMessage};

pub fn reject(id: ConnectionId, request: RequestKind, reason: RejectReason) -> Outbound {
    Outbound::to(id, ServerMessage::Rejected { request, reason })
}

/// Greets a new connection and tells the room about the new head count.
pub fn handle_connect(world: &GameWorld, id: ConnectionId, connections: usize) -> Vec<Outbound> {
    vec![
        Outbound::to(id, world.welcome(id)),
        Outbound::all(ServerMessage::UserCount { count: connections }),
    ]
}

/// Removes the sender's entity, if any, and broadcasts the departure.
pub fn handle_disconnect(
    world: &mut GameWorld,
    id: ConnectionId,
    connections: usize,
    now: u64,
) -> Vec<Outbound> {
    let mut out = Vec::new();
    if let Some(report) = world.leave(id, now) {
        out.push(Outbound::all_except(
            id,
            ServerMessage::PlayerLeft {
                id: report.entity.id,
                remaining: world.store().len(),
            },
        ));
        if let Some(summary) = report.game_over {
            out.push(Outbound::all_except(id, ServerMessage::GameOver(summary)));
        }
    }
    out.push(Outbound::all_except(
        id,
        ServerMessage::UserCount { count: connections },
    ));
    out
}

pub fn handle_message(
    world: &mut GameWorld,
    sender: ConnectionId,
    message: ClientMessage,
    now: u64,
) -> Vec<Outbound> {
    let request = message.kind();
    let result = match message {
        ClientMessage::Join { name } => on_join(world, sender, name, now),
        ClientMessage::Input(input) => {
            // Inputs from unknown senders are dropped without a reply.
            if !world.store().contains(sender) {
                return Vec::new();
            }
            world.apply_input(sender, &input).map(|_| Vec::new())
        }
        ClientMessage::Attack { target_x, target_y } => world
            .attack(sender, Vec2::new(target_x, target_y), now)
            .map(|report| attack_messages(sender, target_x, target_y, report, now)),
        ClientMessage::Action { kind } => world.perform_action(sender, kind).map(|_| {
            vec![Outbound::all(ServerMessage::ActionPerformed {
                id: sender,
                kind,
                timestamp: now,
            })]
        }),
        ClientMessage::MoveTo { x, y } => world.move_to(sender, x, y).map(|steps| {
            debug!("{} walking {} steps towards ({}, {})", sender, steps, x, y);
            Vec::new()
        }),
        ClientMessage::ApplyForce { force } => world.apply_force(sender, force).map(|_| {
            vec![Outbound::all(ServerMessage::ForceApplied { id: sender, force })]
        }),
        ClientMessage::Respawn => world.respawn(sender).map(|position| {
            vec![Outbound::all(ServerMessage::Respawned {
                id: sender,
                position: position.rounded(),
            })]
        }),
        ClientMessage::RequestStart => world.request_start(sender, now).map(|request| match request {
            StartRequest::Countdown(countdown) => vec![Outbound::all(ServerMessage::GameStarting {
                countdown,
                message: format!("Game starting in {}...", countdown),
            })],
            StartRequest::AlreadyRequested => vec![Outbound::to(
                sender,
                ServerMessage::StartAlreadyRequested {
                    message: "Game start already requested".to_string(),
                },
            )],
        }),
        ClientMessage::Ping { timestamp } => Ok(vec![Outbound::to(sender, ServerMessage::Pong { timestamp })]),
    };

    result.unwrap_or_else(|reason| {
        warn!("Rejected {:?} from {}: {:?}", request, sender, reason);
        vec![reject(sender, request, reason)]
    })
}

fn on_join(
    world: &mut GameWorld,
    sender: ConnectionId,
    name: Option<String>,
    now: u64,
) -> Result<Vec<Outbound>, RejectReason> {
    let entity = world.join(sender, name, now)?;
    Ok(vec![
        Outbound::to(sender, ServerMessage::Snapshot(world.snapshot(now))),
        Outbound::all(ServerMessage::PlayerJoined {
            id: entity.id,
            name: entity.name,
            position: entity.position.rounded(),
        }),
    ])
}

fn attack_messages(
    attacker: ConnectionId,
    target_x: f32,
    target_y: f32,
    report: CombatReport,
    now: u64,
) -> Vec<Outbound> {
    let mut out = vec![Outbound::all(ServerMessage::AttackPerformed {
        attacker,
        target_x,
        target_y,
        hits: report.hits.iter().map(|hit| hit.target).collect(),
        timestamp: now,
    })];
    out.extend(
        report
            .eliminations
            .iter()
            .map(|record| Outbound::all(eliminated_message(record))),
    );
    if let Some(summary) = report.game_over {
        out.push(Outbound::all(ServerMessage::GameOver(summary)));
    }
    out
}
