use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use shared::ServerMessage;
use tokio::sync::mpsc::{self, error::TrySendError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Frames a peer may have queued before further sends to it are dropped.
pub const OUTGOING_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum UnreachablePeer {
    #[error("{0} is not keeping up with its outbound queue")]
    Backlogged(ConnectionId),
    #[error("{0} is closed")]
    Closed(ConnectionId),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Unreachable(#[from] UnreachablePeer),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sending half of a peer's bounded outbound queue. The task that owns the
/// socket drains the other half, so a peer is open for as long as that task
/// runs.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    id: ConnectionId,
    outgoing_tx: mpsc::Sender<String>,
}

impl PeerConnection {
    pub fn new(outgoing_tx: mpsc::Sender<String>) -> Self {
        Self {
            id: ConnectionId::next(),
            outgoing_tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.outgoing_tx.is_closed()
    }

    /// Never waits: a full queue counts as an unreachable peer.
    pub fn send_text(&self, frame: String) -> Result<(), UnreachablePeer> {
        self.outgoing_tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => UnreachablePeer::Backlogged(self.id),
            TrySendError::Closed(_) => UnreachablePeer::Closed(self.id),
        })
    }

    pub fn send_message(&self, message: &ServerMessage) -> Result<(), SendError> {
        let frame = message.to_text()?;
        self.send_text(frame)?;

        Ok(())
    }
}
