use shared::entity::ConnectionId;
use shared::protocol::ServerMessage;

/// Who receives an outbound message within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Only(ConnectionId),
    AllExcept(ConnectionId),
    All,
}

impl Recipient {
    pub fn includes(&self, id: ConnectionId) -> bool {
        match *self {
            Recipient::Only(target) => target == id,
            Recipient::AllExcept(excluded) => excluded != id,
            Recipient::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub recipient: Recipient,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn to(id: ConnectionId, message: ServerMessage) -> Self {
        Self {
            recipient: Recipient::Only(id),
            message,
        }
    }

    pub fn all(message: ServerMessage) -> Self {
        Self {
            recipient: Recipient::All,
            message,
        }
    }

    pub fn all_except(id: ConnectionId, message: ServerMessage) -> Self {
        Self {
            recipient: Recipient::AllExcept(id),
            message,
        }
    }
}
