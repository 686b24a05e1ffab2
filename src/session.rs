//! Session / Protocol Layer: the per-connection state machine
//! and the dispatch of validated frames to the `RoomManager`.

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::instrument;

use crate::error::ErrorCode;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::room::RoomManager;

/// `New -> InRoom -> Closing -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    InRoom,
    Closing,
    Closed,
}

/// One live client connection. Owns the outbound queue registered with the
/// `RoomManager` at join time; a dedicated writer task (the transport layer)
/// drains `Session::take_receiver`'s channel to the wire.
pub struct Session {
    client_id: String,
    user_id: String,
    room_id: Option<String>,
    state: SessionState,
    tx: mpsc::Sender<ServerFrame>,
    /// Set once `JOIN_ROOM` succeeds; lets the transport loop notice the
    /// Room Manager evicting this session on its own (e.g. a full outbound
    /// queue) rather than the client requesting to leave.
    closed: Option<Arc<Notify>>,
}

impl Session {
    /// Creates a new, idle (`New`) session with a bounded outbound queue of
    /// `send_queue_cap` frames.
    pub fn new(client_id: impl Into<String>, send_queue_cap: usize) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(send_queue_cap);
        let session = Self {
            client_id: client_id.into(),
            user_id: String::new(),
            room_id: None,
            state: SessionState::New,
            tx,
            closed: None,
        };
        (session, rx)
    }

    /// Resolves once the Room Manager evicts this session, or never if it
    /// hasn't joined a room yet. Meant to be polled in a `select!` loop
    /// alongside inbound/outbound traffic.
    pub async fn wait_evicted(&self) {
        match &self.closed {
            Some(n) => n.notified().await,
            None => std::future::pending().await,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The sender half handed to the `RoomManager` at join time so it can
    /// push ACKs, broadcasts, and advisories directly to this session.
    pub fn sender(&self) -> mpsc::Sender<ServerFrame> {
        self.tx.clone()
    }

    /// Dispatches one validated inbound frame, returning the direct reply (if
    /// any) the session itself owes the client. `OT_OP`/`CURSOR_UPDATE`
    /// success paths return `None` here because the `RoomManager` already
    /// pushed the ACK/broadcast onto this session's queue directly.
    #[instrument(skip(self, rooms), fields(client_id = %self.client_id))]
    pub async fn handle(&mut self, frame: ClientFrame, rooms: &RoomManager, now_ts: i64) -> Option<ServerFrame> {
        if self.state == SessionState::New && !matches!(frame, ClientFrame::JoinRoom { .. }) {
            return Some(self.error_frame(ErrorCode::NotJoined, "session has not joined a room", None, now_ts));
        }

        match frame {
            ClientFrame::JoinRoom { room_id, user_id, client_id, user_info } => {
                if self.state == SessionState::InRoom {
                    return Some(self.error_frame(
                        ErrorCode::AlreadyJoined,
                        "session is already joined to a room",
                        Some(room_id),
                        now_ts,
                    ));
                }
                match rooms.join(&room_id, &user_id, &client_id, user_info, self.tx.clone()).await {
                    Ok(outcome) => {
                        self.room_id = Some(room_id.clone());
                        self.user_id = user_id;
                        self.state = SessionState::InRoom;
                        self.closed = Some(outcome.closed);
                        Some(ServerFrame::JoinRoomAck {
                            room_id,
                            client_id,
                            version: outcome.version,
                            content: outcome.content,
                            participants: outcome.participants,
                        })
                    }
                    Err(e) => Some(self.error_frame(e.code(), e.to_string(), Some(room_id), now_ts)),
                }
            }

            ClientFrame::LeaveRoom { room_id, client_id } => match rooms.leave(&room_id, &client_id) {
                Ok(()) => {
                    self.room_id = None;
                    self.state = SessionState::New;
                    self.closed = None;
                    Some(ServerFrame::LeaveRoomAck { room_id, client_id })
                }
                Err(e) => Some(self.error_frame(e.code(), e.to_string(), Some(room_id), now_ts)),
            },

            ClientFrame::OtOp { room_id, client_id, operation } => {
                match rooms.submit_operation(&room_id, &client_id, operation).await {
                    Ok(_) => None,
                    Err(e) => Some(self.error_frame(e.code(), e.message(), Some(room_id), now_ts)),
                }
            }

            ClientFrame::CursorUpdate { room_id, client_id, cursor } => {
                match rooms.cursor_update(&room_id, &client_id, cursor) {
                    Ok(()) => None,
                    Err(e) => Some(self.error_frame(e.code(), e.to_string(), Some(room_id), now_ts)),
                }
            }

            ClientFrame::SyncState { room_id, client_id, from_version } => {
                match rooms.sync_state(&room_id, &client_id, from_version).await {
                    Ok(outcome) => Some(ServerFrame::SyncStateResponse {
                        snapshot: outcome.snapshot,
                        operations: outcome.operations,
                        participants: outcome.participants,
                        cursor_states: outcome.cursor_states,
                    }),
                    Err(e) => Some(self.error_frame(e.code(), e.to_string(), Some(room_id), now_ts)),
                }
            }

            // Client-originated ACKs are an optional hint; the
            // server doesn't track per-op delivery confirmation.
            ClientFrame::Ack { .. } => None,
        }
    }

    /// Disconnection: removes the session from its room and
    /// broadcasts `PARTICIPANT_LEFT`. Idempotent if already `Closed`.
    pub fn close(&mut self, rooms: &RoomManager) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        if let Some(room_id) = self.room_id.take() {
            let _ = rooms.leave(&room_id, &self.client_id);
        }
        self.state = SessionState::Closed;
    }

    fn error_frame(&self, code: ErrorCode, message: impl Into<String>, room_id: Option<String>, now_ts: i64) -> ServerFrame {
        ServerFrame::error(code, message, room_id, Some(self.client_id.clone()), now_ts)
    }
}
