//! Wire frame types: a tagged sum over the recognized frame
//! kinds, decoded from a single self-describing JSON shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::ot::{Operation, OperationType};

/// Raw, loosely-validated client→server frame, as deserialized straight off
/// the wire. [`crate::protocol::validator::validate`] turns this into a
/// [`ClientFrame`] or a [`crate::error::ValidationError`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawClientFrame {
    JoinRoom {
        room_id: String,
        user_id: String,
        client_id: String,
        #[serde(default)]
        user_info: Option<HashMap<String, String>>,
    },
    LeaveRoom {
        room_id: String,
        client_id: String,
    },
    OtOp {
        room_id: String,
        client_id: String,
        operation: RawOperation,
    },
    CursorUpdate {
        room_id: String,
        client_id: String,
        cursor: RawCursor,
    },
    SyncState {
        room_id: String,
        client_id: String,
        from_version: i64,
    },
    Ack {
        room_id: String,
        client_id: String,
        operation_id: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOperation {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub op_type: String,
    pub position: i64,
    pub content: String,
    pub base_version: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCursor {
    pub line: i64,
    pub column: i64,
}

/// A validated, strongly-typed client→server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    JoinRoom { room_id: String, user_id: String, client_id: String, user_info: Option<HashMap<String, String>> },
    LeaveRoom { room_id: String, client_id: String },
    OtOp { room_id: String, client_id: String, operation: Operation },
    CursorUpdate { room_id: String, client_id: String, cursor: Cursor },
    SyncState { room_id: String, client_id: String, from_version: u64 },
    Ack { room_id: String, client_id: String, operation_id: String },
}

impl ClientFrame {
    pub fn room_id(&self) -> &str {
        match self {
            ClientFrame::JoinRoom { room_id, .. }
            | ClientFrame::LeaveRoom { room_id, .. }
            | ClientFrame::OtOp { room_id, .. }
            | ClientFrame::CursorUpdate { room_id, .. }
            | ClientFrame::SyncState { room_id, .. }
            | ClientFrame::Ack { room_id, .. } => room_id,
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            ClientFrame::JoinRoom { client_id, .. }
            | ClientFrame::LeaveRoom { client_id, .. }
            | ClientFrame::OtOp { client_id, .. }
            | ClientFrame::CursorUpdate { client_id, .. }
            | ClientFrame::SyncState { client_id, .. }
            | ClientFrame::Ack { client_id, .. } => client_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub line: u64,
    pub column: u64,
}

/// Server→client / server→peers frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerFrame {
    JoinRoomAck {
        room_id: String,
        client_id: String,
        version: u64,
        content: String,
        participants: Vec<ParticipantInfo>,
    },
    LeaveRoomAck {
        room_id: String,
        client_id: String,
    },
    ParticipantJoined {
        room_id: String,
        client_id: String,
        user_id: String,
        participants: Vec<ParticipantInfo>,
    },
    ParticipantLeft {
        room_id: String,
        client_id: String,
        user_id: String,
        participants: Vec<ParticipantInfo>,
    },
    Ack {
        operation_id: String,
        version: u64,
    },
    OtOpBroadcast {
        room_id: String,
        operation: Operation,
        version: u64,
        sender_client_id: String,
    },
    CursorUpdateBroadcast {
        room_id: String,
        client_id: String,
        user_id: String,
        cursor: Cursor,
    },
    SyncStateResponse {
        snapshot: SnapshotView,
        operations: Vec<Operation>,
        participants: Vec<ParticipantInfo>,
        cursor_states: Vec<CursorState>,
    },
    Backpressure {
        room_id: String,
        client_id: String,
        message: String,
    },
    Error {
        code: ErrorCode,
        message: String,
        room_id: Option<String>,
        client_id: Option<String>,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub client_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotView {
    pub version: u64,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorState {
    pub user_id: String,
    pub cursor: Cursor,
}

impl ServerFrame {
    pub fn error(code: ErrorCode, message: impl Into<String>, room_id: Option<String>, client_id: Option<String>, timestamp: i64) -> Self {
        ServerFrame::Error { code, message: message.into(), room_id, client_id, timestamp }
    }
}

pub(crate) fn parse_op_type(s: &str) -> Option<OperationType> {
    match s {
        "insert" => Some(OperationType::Insert),
        "delete" => Some(OperationType::Delete),
        _ => None,
    }
}
