//! WebSocket transport shell around the game worlds
//!
//! Per-connection tasks only move frames: a reader forwards decoded frames
//! to the main loop and a writer drains the connection's outgoing queue.
//! All simulation state is owned by [`Server::run`]'s single loop, which
//! also receives the tick signals from each room's [`SimulationClock`].

use crate::client_manager::ClientManager;
use crate::clock::SimulationClock;
use crate::error::ServerError;
use crate::gateway;
use crate::outbound::Outbound;
use crate::registry::SessionRegistry;
use crate::settings::ServerSettings;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::config::GameMode;
use shared::entity::ConnectionId;
use shared::now_millis;
use shared::protocol::{self, ClientMessage, Frame, RejectReason, RequestKind, ServerMessage, WireFormat};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Events delivered to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        addr: SocketAddr,
        room: GameMode,
        sender: mpsc::UnboundedSender<Message>,
        reply: oneshot::Sender<Option<ConnectionId>>,
    },
    Frame {
        id: ConnectionId,
        frame: Frame,
    },
    Disconnected {
        id: ConnectionId,
    },
    Tick {
        room: GameMode,
    },
}

/// Main server coordinating connections, rooms and their clocks
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    settings: ServerSettings,
    clients: ClientManager,
    registry: SessionRegistry,
    clocks: HashMap<GameMode, SimulationClock>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    /// Binds the listening socket. Failing to bind is the one fatal error.
    pub async fn bind(settings: ServerSettings) -> Result<Self, ServerError> {
        let addr = settings.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on ws://{}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(settings.max_clients, settings.client_timeout()),
            registry: SessionRegistry::new(settings.clone()),
            settings,
            clocks: HashMap::new(),
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the task accepting TCP connections and upgrading them
    fn spawn_acceptor(&mut self, listener: TcpListener) {
        let event_tx = self.event_tx.clone();
        let default_mode = self.settings.default_mode;

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let event_tx = event_tx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, addr, default_mode, event_tx).await;
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Main server loop. Runs until the event channel closes.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        if let Some(listener) = self.listener.take() {
            self.spawn_acceptor(listener);
        }

        let mut sweep = interval(Duration::from_secs(1));
        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
                _ = sweep.tick() => {
                    for client in self.clients.check_timeouts() {
                        warn!("Client {} timed out", client.id);
                        client.send(Message::Close(None));
                        self.disconnect(client.id, client.room);
                    }
                },
            }
        }

        for clock in self.clocks.values_mut() {
            clock.stop();
        }
        Ok(())
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected {
                addr,
                room,
                sender,
                reply,
            } => {
                let id = self.clients.add_client(addr, room, sender);
                if id.is_none() {
                    warn!("Refusing {}: server full", addr);
                }
                if reply.send(id).is_err() {
                    // Connection task is already gone.
                    if let Some(id) = id {
                        self.clients.remove_client(id);
                    }
                    return;
                }
                if let Some(id) = id {
                    self.connect(id, room);
                }
            }
            ServerEvent::Frame { id, frame } => self.handle_frame(id, frame),
            ServerEvent::Disconnected { id } => {
                if let Some(client) = self.clients.remove_client(id) {
                    self.disconnect(id, client.room);
                }
            }
            ServerEvent::Tick { room } => self.tick_room(room),
        }
    }

    fn connect(&mut self, id: ConnectionId, room: GameMode) {
        let connections = self.clients.room_len(room);
        let world = match self.registry.world_mut(room) {
            Ok(world) => world,
            Err(e) => {
                error!("Cannot open {} room: {}", room, e);
                self.send_reject(id, RequestKind::Connect, RejectReason::UnknownMode);
                return;
            }
        };
        let out = gateway::handle_connect(world, id, connections);
        self.dispatch(room, out);
        self.start_clock(room);
    }

    fn disconnect(&mut self, id: ConnectionId, room: GameMode) {
        let connections = self.clients.room_len(room);
        if let Some(world) = self.registry.get_mut(room) {
            let out = gateway::handle_disconnect(world, id, connections, now_millis());
            self.dispatch(room, out);
        }
        if connections == 0 {
            if let Some(clock) = self.clocks.get_mut(&room) {
                clock.stop();
            }
        }
    }

    fn handle_frame(&mut self, id: ConnectionId, frame: Frame) {
        let format = frame.format();
        let Some(room) = self.clients.get(id).map(|client| client.room) else {
            debug!("Frame from unknown connection {}", id);
            return;
        };
        self.clients.touch(id, format);

        let message: ClientMessage = match protocol::decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Malformed {:?} frame from {}: {}", format, id, e);
                self.send_reject(id, RequestKind::Unknown, RejectReason::Malformed);
                return;
            }
        };

        if let Some(world) = self.registry.get_mut(room) {
            let out = gateway::handle_message(world, id, message, now_millis());
            self.dispatch(room, out);
        }
    }

    fn tick_room(&mut self, room: GameMode) {
        let Some(world) = self.registry.get_mut(room) else {
            return;
        };
        let messages = world.tick(now_millis());
        let tick = world.tick_count();
        let tick_rate = world.config().tick_rate.max(1.0) as u64;
        let out = messages.into_iter().map(Outbound::all).collect();
        self.dispatch(room, out);

        if tick % (tick_rate * 10) == 0 {
            debug!(
                "{} tick {}: {} clients, {} entities",
                room,
                tick,
                self.clients.room_len(room),
                world_len(&self.registry, room)
            );
        }
    }

    fn start_clock(&mut self, room: GameMode) {
        let Some(world) = self.registry.get(room) else {
            return;
        };
        let period = world.config().tick_period();
        let event_tx = self.event_tx.clone();
        self.clocks
            .entry(room)
            .or_insert_with(|| SimulationClock::new(period))
            .start(move |_| event_tx.send(ServerEvent::Tick { room }).is_ok());
    }

    /// Sends each outbound message to its recipients in `room`, encoding it
    /// at most once per wire format.
    fn dispatch(&self, room: GameMode, out: Vec<Outbound>) {
        let members = self.clients.members(room);
        for outbound in out {
            let mut encoded: [Option<Message>; 2] = [None, None];
            for client in members.iter().filter(|c| outbound.recipient.includes(c.id)) {
                let slot = match client.format {
                    WireFormat::Json => 0,
                    WireFormat::Binary => 1,
                };
                if encoded[slot].is_none() {
                    match encode_message(&outbound.message, client.format) {
                        Ok(message) => encoded[slot] = Some(message),
                        Err(e) => {
                            error!("Failed to encode {:?}: {}", outbound.message, e);
                            continue;
                        }
                    }
                }
                if let Some(message) = &encoded[slot] {
                    if !client.send(message.clone()) {
                        debug!("Writer for {} already closed", client.id);
                    }
                }
            }
        }
    }

    fn send_reject(&self, id: ConnectionId, request: RequestKind, reason: RejectReason) {
        if let Some(client) = self.clients.get(id) {
            let message = ServerMessage::Rejected { request, reason };
            match encode_message(&message, client.format) {
                Ok(frame) => {
                    client.send(frame);
                }
                Err(e) => error!("Failed to encode rejection: {}", e),
            }
        }
    }
}

fn world_len(registry: &SessionRegistry, room: GameMode) -> usize {
    registry.get(room).map_or(0, |world| world.store().len())
}

pub fn encode_message(message: &ServerMessage, format: WireFormat) -> Result<Message, protocol::ProtocolError> {
    Ok(match protocol::encode(message, format)? {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    })
}

/// Upgrades one TCP stream, registers it, and shuttles frames until close
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    default_mode: GameMode,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut path = String::from("/");
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();
        Ok(response)
    };
    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };
    let (mut ws_sink, mut ws_receiver) = ws_stream.split();

    let room = match GameMode::from_path(&path, default_mode) {
        Ok(room) => room,
        Err(e) => {
            warn!("{} asked for {}: {}", addr, path, e);
            refuse(&mut ws_sink, RejectReason::UnknownMode).await;
            return;
        }
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let (reply_tx, reply_rx) = oneshot::channel();
    let registered = event_tx.send(ServerEvent::Connected {
        addr,
        room,
        sender: out_tx.clone(),
        reply: reply_tx,
    });
    let id = match (registered, reply_rx.await) {
        (Ok(()), Ok(Some(id))) => id,
        (Ok(()), Ok(None)) => {
            refuse(&mut ws_sink, RejectReason::ServerFull).await;
            return;
        }
        _ => return,
    };

    let mut writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = ws_sink.send(message).await {
                debug!("Send to {} failed: {}", id, e);
                break;
            }
            if closing {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    loop {
        // The writer only finishes when the server closed the connection.
        let message = tokio::select! {
            message = ws_receiver.next() => match message {
                Some(message) => message,
                None => break,
            },
            _ = &mut writer => {
                info!("Connection {} closed by server", id);
                break;
            }
        };
        let frame = match message {
            Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => Frame::Binary(bytes.to_vec()),
            Ok(Message::Ping(data)) => {
                let _ = out_tx.send(Message::Pong(data));
                continue;
            }
            Ok(Message::Close(_)) => {
                info!("Connection {} requested close", id);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error for connection {}: {}", id, e);
                break;
            }
        };
        if event_tx.send(ServerEvent::Frame { id, frame }).is_err() {
            break;
        }
    }

    let _ = event_tx.send(ServerEvent::Disconnected { id });
    drop(out_tx);
    writer.abort();
}

async fn refuse<S>(sink: &mut S, reason: RejectReason)
where
    S: futures::Sink<Message> + Unpin,
{
    let message = ServerMessage::Rejected {
        request: RequestKind::Connect,
        reason,
    };
    if let Ok(frame) = encode_message(&message, WireFormat::Json) {
        let _ = sink.send(frame).await;
    }
    let _ = sink.close().await;
}
