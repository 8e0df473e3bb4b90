use crate::input::{InputManager, WanderPattern};
use crate::predictor::{ClientPredictor, PredictorSettings, Reconciliation};
use crate::stats::NetworkStats;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::action::ActionKind;
use shared::config::{GameConfig, GameMode};
use shared::entity::ConnectionId;
use shared::math::Vec2;
use shared::now_millis;
use shared::protocol::{self, ClientMessage, Frame, ProtocolError, ServerMessage, WireFormat};
use shared::session::Phase;
use shared::tiles::TileMap;
use std::error::Error;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

pub type ClientResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// How a bot connects and behaves
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Full WebSocket URL including the room path
    pub url: String,
    pub name: Option<String>,
    /// Simulated latency, split evenly between sending and receiving
    pub fake_ping_ms: u64,
    pub format: WireFormat,
    pub seed: Option<u64>,
    /// Ask the server to start a round right after joining
    pub request_start: bool,
}

/// Headless bot: joins a room, wanders, fights and reports link quality
pub struct Client {
    options: ClientOptions,
    connection_id: Option<ConnectionId>,
    mode: Option<GameMode>,
    config: Option<GameConfig>,
    tiles: Option<TileMap>,
    phase: Phase,
    predictor: Option<ClientPredictor>,
    input_manager: InputManager,
    wander: WanderPattern,
    stats: NetworkStats,
}

impl Client {
    pub fn new(options: ClientOptions) -> Self {
        let wander = WanderPattern::new(options.seed);
        Self {
            options,
            connection_id: None,
            mode: None,
            config: None,
            tiles: None,
            phase: Phase::Waiting,
            predictor: None,
            input_manager: InputManager::new(),
            wander,
            stats: NetworkStats::new(),
        }
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn predictor(&self) -> Option<&ClientPredictor> {
        self.predictor.as_ref()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Applies one server message and returns the replies it calls for.
    pub fn handle_message(&mut self, message: ServerMessage) -> Vec<ClientMessage> {
        match message {
            ServerMessage::Welcome {
                connection_id,
                mode,
                tick_rate,
                map,
                tiles,
            } => {
                info!("Connected! Client ID: {} in {} ({} Hz)", connection_id, mode, tick_rate);
                let mut predictor = ClientPredictor::for_mode(mode, map, PredictorSettings::default());
                predictor.set_own_id(connection_id);
                self.connection_id = Some(connection_id);
                self.mode = Some(mode);
                self.config = Some(GameConfig::for_mode(mode));
                self.tiles = tiles;
                self.predictor = Some(predictor);

                let mut replies = vec![ClientMessage::Join {
                    name: self.options.name.clone(),
                }];
                if self.options.request_start {
                    replies.push(ClientMessage::RequestStart);
                }
                replies
            }

            ServerMessage::Snapshot(snapshot) => {
                self.stats.snapshots += 1;
                self.phase = snapshot.phase;
                if let Some(predictor) = self.predictor.as_mut() {
                    match predictor.reconcile(&snapshot) {
                        Reconciliation::Adopted => {
                            if let Some(own) = predictor.own() {
                                info!("Spawned as {} at {:?}", own.name, own.position);
                            }
                        }
                        Reconciliation::Corrected { distance, replayed } => {
                            self.stats.corrections += 1;
                            debug!("Corrected {:.2}px, replayed {} inputs", distance, replayed);
                        }
                        _ => {}
                    }
                }
                Vec::new()
            }

            ServerMessage::Tick { .. } => {
                self.stats.ticks += 1;
                Vec::new()
            }

            ServerMessage::Pong { timestamp } => {
                let ping_ms = now_millis().saturating_sub(timestamp);
                self.stats.record_ping(ping_ms as f32);
                Vec::new()
            }

            ServerMessage::Rejected { request, reason } => {
                self.stats.rejections += 1;
                warn!("Server rejected {:?}: {:?}", request, reason);
                Vec::new()
            }

            ServerMessage::PlayerLeft { id, remaining } => {
                debug!("Entity {} left, {} remain", id, remaining);
                if let Some(predictor) = self.predictor.as_mut() {
                    predictor.forget(id);
                }
                Vec::new()
            }

            ServerMessage::Eliminated { id, reason, rank } if Some(id) == self.connection_id => {
                info!("Eliminated by {:?}, finished #{}", reason, rank);
                let can_respawn = self
                    .config
                    .as_ref()
                    .map_or(false, |config| config.session.allow_respawn);
                if can_respawn {
                    vec![ClientMessage::Respawn]
                } else {
                    Vec::new()
                }
            }

            ServerMessage::GameStarting { message, .. } => {
                info!("{}", message);
                Vec::new()
            }

            ServerMessage::GameStarted { game_id, player_count } => {
                info!("Game {} started with {} players", game_id, player_count);
                self.phase = Phase::Playing;
                Vec::new()
            }

            ServerMessage::GameOver(summary) => {
                info!(
                    "Game over after {}ms, winner {:?} of {}",
                    summary.duration_ms, summary.winner, summary.total_players
                );
                self.phase = Phase::Ended;
                Vec::new()
            }

            ServerMessage::GameReset { game_id } => {
                info!("Room reset, next game {}", game_id);
                self.phase = Phase::Waiting;
                Vec::new()
            }

            other => {
                debug!("Server message: {:?}", other);
                Vec::new()
            }
        }
    }

    /// Next wander step, predicted locally before it is sent.
    pub fn next_input(&mut self) -> Option<ClientMessage> {
        let config = self.config.as_ref()?;
        config.movement?;
        if config.session.gate_input_on_phase && self.phase != Phase::Playing {
            return None;
        }
        let predictor = self.predictor.as_mut()?;
        if !predictor.own()?.is_alive() {
            return None;
        }

        let input = self.input_manager.update(self.wander.sample())?;
        predictor.apply_local_input(input);
        self.stats.inputs_sent += 1;
        Some(ClientMessage::Input(input))
    }

    /// Mode-specific occasional action: attack, punch, walk or push.
    pub fn next_action(&mut self) -> Option<ClientMessage> {
        let mode = self.mode?;
        let config = self.config.as_ref()?;
        let predictor = self.predictor.as_ref()?;
        let own = predictor.own()?;
        if !own.is_alive() {
            return None;
        }

        match mode {
            GameMode::BattleRoyale => {
                let range = config.combat?.range;
                if own.cooldown > 0 || (config.session.gate_input_on_phase && self.phase != Phase::Playing) {
                    return None;
                }
                predictor
                    .remotes()
                    .filter(|remote| remote.latest.health > 0)
                    .map(|remote| remote.latest.position)
                    .find(|position| position.distance(&own.position) <= range)
                    .map(|target| ClientMessage::Attack {
                        target_x: target.x,
                        target_y: target.y,
                    })
            }
            GameMode::Boxing => {
                if own.cooldown > 0 {
                    return None;
                }
                let energy = own.energy.unwrap_or(0.0);
                let affordable: Vec<ActionKind> = ActionKind::ALL
                    .into_iter()
                    .filter(|kind| kind.spec().energy_cost <= energy)
                    .collect();
                if affordable.is_empty() {
                    return None;
                }
                let kind = affordable[self.wander.rng().gen_range(0..affordable.len())];
                Some(ClientMessage::Action { kind })
            }
            GameMode::TileWorld => {
                let tiles = self.tiles.as_ref()?;
                if own.moving {
                    return None;
                }
                let (columns, rows) = (tiles.columns, tiles.rows);
                (0..10)
                    .map(|_| self.wander.point(columns as f32, rows as f32))
                    .map(|point| (point.x as u32, point.y as u32))
                    .find(|&(x, y)| tiles.is_walkable(x as i64, y as i64))
                    .map(|(x, y)| ClientMessage::MoveTo { x, y })
            }
            GameMode::Physics => {
                let rng = self.wander.rng();
                let force = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..-0.2)).scale(300.0);
                Some(ClientMessage::ApplyForce { force })
            }
        }
    }

    fn send(&self, out_tx: &UnboundedSender<Message>, message: &ClientMessage) -> bool {
        match to_message(message, self.options.format) {
            Ok(frame) => out_tx.send(frame).is_ok(),
            Err(e) => {
                error!("Failed to encode {:?}: {}", message, e);
                true
            }
        }
    }

    /// Connects and plays until the server closes the connection.
    pub async fn run(&mut self) -> ClientResult<()> {
        info!("Connecting to {}...", self.options.url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.options.url.as_str()).await?;
        let (mut ws_sink, mut ws_receiver) = ws_stream.split();

        let fake_ping_ms = self.options.fake_ping_ms;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if fake_ping_ms > 0 {
                    sleep(Duration::from_millis(fake_ping_ms / 2)).await;
                }
                if let Err(e) = ws_sink.send(message).await {
                    error!("Error sending message: {}", e);
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        let mut input_interval = interval(Duration::from_millis(16));
        let mut frame_interval = interval(Duration::from_millis(16));
        let mut action_interval = interval(Duration::from_millis(500));
        let mut ping_interval = interval(Duration::from_secs(5));
        let mut report_interval = interval(Duration::from_secs(5));
        for timer in [
            &mut input_interval,
            &mut frame_interval,
            &mut action_interval,
            &mut ping_interval,
            &mut report_interval,
        ] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        loop {
            let outgoing = tokio::select! {
                message = ws_receiver.next() => {
                    let frame = match message {
                        Some(Ok(Message::Text(text))) => Frame::Text(text.as_str().to_owned()),
                        Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes.to_vec()),
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Server closed the connection");
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            error!("Error receiving message: {}", e);
                            break;
                        }
                    };
                    if fake_ping_ms > 0 {
                        sleep(Duration::from_millis(fake_ping_ms / 2)).await;
                    }
                    match protocol::decode::<ServerMessage>(&frame) {
                        Ok(message) => self.handle_message(message),
                        Err(e) => {
                            warn!("Undecodable {:?} frame: {}", frame.format(), e);
                            Vec::new()
                        }
                    }
                },

                _ = input_interval.tick() => self.next_input().into_iter().collect(),

                _ = frame_interval.tick() => {
                    if let Some(predictor) = self.predictor.as_mut() {
                        predictor.interpolate();
                    }
                    Vec::new()
                },

                _ = action_interval.tick() => self.next_action().into_iter().collect(),

                _ = ping_interval.tick() => vec![ClientMessage::Ping { timestamp: now_millis() }],

                _ = report_interval.tick() => {
                    if let Some(id) = self.connection_id {
                        info!("Client {}: {}", id, self.stats);
                    }
                    Vec::new()
                },
            };

            if !outgoing.iter().all(|message| self.send(&out_tx, message)) {
                warn!("Writer task stopped");
                break;
            }
        }

        drop(out_tx);
        let _ = writer.await;
        Ok(())
    }
}

/// Encodes a client message as a WebSocket frame in the given codec
pub fn to_message(message: &ClientMessage, format: WireFormat) -> Result<Message, ProtocolError> {
    Ok(match protocol::encode(message, format)? {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    })
}
