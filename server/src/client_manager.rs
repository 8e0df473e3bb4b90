//! Connection roster for the WebSocket server
//!
//! This module tracks every live connection independently of whether it has
//! joined a game yet:
//! - Connection id allocation and capacity enforcement
//! - Room membership (one game mode per connection)
//! - Activity tracking and idle-timeout sweeps
//! - The outgoing frame queue and preferred wire format of each connection
//!
//! Entities live in the game worlds; this roster only knows how to reach
//! the people behind them.

use log::{debug, info};
use shared::config::GameMode;
use shared::entity::ConnectionId;
use shared::protocol::WireFormat;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;

/// A live connection and the queue feeding its writer task
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Game mode room chosen by the request path
    pub room: GameMode,
    /// Last time any frame arrived from this connection
    pub last_seen: Instant,
    /// Codec of the most recent inbound frame; replies use the same one
    pub format: WireFormat,
    sender: UnboundedSender<Message>,
}

impl Client {
    /// Creates a client that has just been seen, speaking JSON until it
    /// sends a binary frame.
    pub fn new(id: ConnectionId, addr: SocketAddr, room: GameMode, sender: UnboundedSender<Message>) -> Self {
        Self {
            id,
            addr,
            room,
            last_seen: Instant::now(),
            format: WireFormat::Json,
            sender,
        }
    }

    /// Checks if the client has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Queues a frame for the writer task. Returns false once the writer
    /// has gone away.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Manages all live connections
///
/// Ids start from 1 and are never reused while the server runs, so a late
/// message from a closed connection can never be attributed to a newcomer.
pub struct ClientManager {
    /// Connected clients indexed by their id
    clients: HashMap<ConnectionId, Client>,
    /// Next id handed out to a new connection
    next_client_id: u32,
    /// Maximum number of concurrent connections allowed
    max_clients: usize,
    /// Silence allowed before a connection is treated as gone
    timeout: Duration,
}

impl ClientManager {
    /// Creates an empty roster with the given capacity and idle timeout
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Registers a new connection
    ///
    /// Returns the allocated id, or None if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        room: GameMode,
        sender: UnboundedSender<Message>,
    ) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let id = ConnectionId(self.next_client_id);
        self.next_client_id += 1;

        info!("Client {} connected from {} to /{}", id, addr, room);
        self.clients.insert(id, Client::new(id, addr, room, sender));
        Some(id)
    }

    /// Removes a connection, returning it if it was still registered.
    /// Double removal from racing close and timeout paths is harmless.
    pub fn remove_client(&mut self, id: ConnectionId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Records activity and the codec of the frame that just arrived
    pub fn touch(&mut self, id: ConnectionId, format: WireFormat) -> bool {
        match self.clients.get_mut(&id) {
            Some(client) => {
                client.last_seen = Instant::now();
                client.format = format;
                true
            }
            None => false,
        }
    }

    /// Removes every connection that has been idle past the timeout
    ///
    /// Returns the removed clients so their entities can be cleaned up in
    /// the right rooms.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(self.timeout))
            .map(|client| client.id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| {
                debug!("Client {} timed out", id);
                self.remove_client(id)
            })
            .collect()
    }

    /// Connections in `room`, ordered by id
    pub fn members(&self, room: GameMode) -> Vec<&Client> {
        let mut members: Vec<&Client> = self
            .clients
            .values()
            .filter(|client| client.room == room)
            .collect();
        members.sort_by_key(|client| client.id);
        members
    }

    pub fn room_len(&self, room: GameMode) -> usize {
        self.clients.values().filter(|client| client.room == room).count()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
