//! Typed error enums for each component boundary.
//!
//! Follows the flat, per-domain `thiserror` enum convention: one variant per
//! failure mode, `#[error("...")]` messages, `#[from]` only at true edges.
//! Internal component errors (`TransformError`, `RoomError`, `ValidationError`)
//! never leak their Rust `Debug` representation to clients; the session layer
//! translates them into the closed `ERROR` code set (see `protocol::frame`).

use thiserror::Error;

/// Closed set of wire-visible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    NotJoined,
    AlreadyJoined,
    UnknownRoom,
    RateLimited,
    StaleBase,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotJoined => "not_joined",
            ErrorCode::AlreadyJoined => "already_joined",
            ErrorCode::UnknownRoom => "unknown_room",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::StaleBase => "stale_base",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

/// Errors raised by the message validator.
#[derive(Debug, Clone, Error)]
#[error("validation error{}: {message}", field.as_ref().map(|f| format!(" ({f})")).unwrap_or_default())]
pub struct ValidationError {
    pub message: String,
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), field: None }
    }

    pub fn field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self { message: message.into(), field: Some(field.into()) }
    }

    pub fn code(&self) -> ErrorCode {
        ErrorCode::ValidationError
    }
}

/// Errors raised by the OT engine's `apply` path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("operation base_version {base_version} is ahead of document version {current_version}")]
    StaleBase { base_version: u64, current_version: u64 },

    #[error("operation position {position} out of bounds for content of length {content_len}")]
    OutOfBounds { position: usize, content_len: usize },
}

impl TransformError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransformError::StaleBase { .. } => ErrorCode::StaleBase,
            TransformError::OutOfBounds { .. } => ErrorCode::InternalError,
        }
    }
}

/// Errors raised by the room manager and session layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0} is unknown")]
    UnknownRoom(String),

    #[error("client {client_id} exceeded rate limit in room {room_id}")]
    RateLimited { room_id: String, client_id: String },

    #[error("session already joined to room {0}")]
    AlreadyJoined(String),

    #[error("session has not joined a room")]
    NotJoined,

    #[error("room {room_id} is full ({max} participants)")]
    RoomFull { room_id: String, max: usize },
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::UnknownRoom(_) => ErrorCode::UnknownRoom,
            RoomError::RateLimited { .. } => ErrorCode::RateLimited,
            RoomError::AlreadyJoined(_) => ErrorCode::AlreadyJoined,
            RoomError::NotJoined => ErrorCode::NotJoined,
            RoomError::RoomFull { .. } => ErrorCode::InternalError,
        }
    }
}

/// Errors from the persistence port. Always non-fatal to callers: the
/// room manager logs and swallows these rather than surfacing them to clients.
#[derive(Debug, Clone, Error)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);

/// Aggregated error for the session/protocol dispatch layer.
#[derive(Debug, Clone, Error)]
pub enum CollabError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CollabError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CollabError::Validation(e) => e.code(),
            CollabError::Transform(e) => e.code(),
            CollabError::Room(e) => e.code(),
            CollabError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}
