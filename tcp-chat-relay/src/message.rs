use std::net::SocketAddr;

use crate::connection::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Bytes read from a client, relayed untouched.
    Chat,
    /// Server notice that a client connected.
    Join,
    /// Server notice that a client went away.
    Leave,
}

/// One payload on its way to every connection except `sender`.
///
/// For notices the sender is the client the notice is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: ConnectionId,
    kind: MessageKind,
    payload: Vec<u8>,
}

impl Message {
    pub fn chat(sender: ConnectionId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            kind: MessageKind::Chat,
            payload: payload.into(),
        }
    }

    pub fn join(subject: ConnectionId, peer: SocketAddr) -> Self {
        Self {
            sender: subject,
            kind: MessageKind::Join,
            payload: join_notice(peer).into_bytes(),
        }
    }

    pub fn leave(subject: ConnectionId, peer: SocketAddr) -> Self {
        Self {
            sender: subject,
            kind: MessageKind::Leave,
            payload: leave_notice(peer).into_bytes(),
        }
    }

    pub fn sender(&self) -> ConnectionId {
        self.sender
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

pub fn join_notice(peer: SocketAddr) -> String {
    format!("[{}:{}] entered room\n", peer.ip(), peer.port())
}

pub fn leave_notice(peer: SocketAddr) -> String {
    format!("Client ({}, {}) is offline\n", peer.ip(), peer.port())
}
