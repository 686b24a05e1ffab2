//! Frame types and the message validator.

pub mod frame;
pub mod validator;

pub use frame::{ClientFrame, Cursor, CursorState, ParticipantInfo, ServerFrame, SnapshotView};
pub use validator::{validate, validate_json};
