//! Participant bookkeeping and the outbound session handle.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Notify};

use crate::protocol::{Cursor, ParticipantInfo, ServerFrame};

/// One live participant in a room.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub joined_at: Instant,
    pub cursor: Option<Cursor>,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, joined_at: Instant) -> Self {
        Self { user_id: user_id.into(), joined_at, cursor: None }
    }
}

/// The room's handle onto one connected session's outbound queue. Sending
/// never blocks: a full queue means the session is unhealthy and gets
/// disconnected by the caller.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub client_id: String,
    pub user_id: String,
    tx: mpsc::Sender<ServerFrame>,
    closed: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(client_id: impl Into<String>, user_id: impl Into<String>, tx: mpsc::Sender<ServerFrame>) -> Self {
        Self { client_id: client_id.into(), user_id: user_id.into(), tx, closed: Arc::new(Notify::new()) }
    }

    /// Attempts to enqueue a frame without waiting. `Err` means the queue is
    /// full (or the receiver is gone) — the session should be torn down.
    pub fn try_send(&self, frame: ServerFrame) -> Result<(), mpsc::error::TrySendError<ServerFrame>> {
        self.tx.try_send(frame)
    }

    /// Frames currently buffered in this session's outbound queue.
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity().saturating_sub(self.tx.capacity())
    }

    /// A clone of this handle's close signal, watched by the owning
    /// session's transport loop.
    pub fn close_signal(&self) -> Arc<Notify> {
        self.closed.clone()
    }

    /// Wakes the owning session's transport loop so it tears the connection
    /// down, for when the Room Manager evicts a session itself (a full
    /// outbound queue) rather than the client requesting to leave.
    pub fn disconnect(&self) {
        self.closed.notify_one();
    }
}

/// Renders the current participant map as the wire-level `participants[]` list.
pub fn participant_infos(participants: &std::collections::HashMap<String, Participant>) -> Vec<ParticipantInfo> {
    participants
        .iter()
        .map(|(client_id, p)| ParticipantInfo { client_id: client_id.clone(), user_id: p.user_id.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_depth_reflects_buffered_frames() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = SessionHandle::new("c1", "u1", tx);
        assert_eq!(handle.queue_depth(), 0);
        handle.try_send(ServerFrame::LeaveRoomAck { room_id: "r".into(), client_id: "c1".into() }).unwrap();
        assert_eq!(handle.queue_depth(), 1);
    }
}
