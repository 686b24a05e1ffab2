//! Message Validator: schema + bounds checks on every inbound
//! frame, producing either a validated [`ClientFrame`] or a typed
//! [`ValidationError`].

use crate::config::Config;
use crate::error::ValidationError;
use crate::ot::{Operation, OperationType};

use super::frame::{parse_op_type, ClientFrame, Cursor, RawClientFrame};

/// Parses a raw JSON frame and validates every field against its configured
/// bound. Returns a [`ValidationError`] for malformed JSON, unrecognized
/// frame types, or any field outside its allowed range.
pub fn validate_json(raw: &str, config: &Config) -> Result<ClientFrame, ValidationError> {
    let raw: RawClientFrame = serde_json::from_str(raw)
        .map_err(|e| ValidationError::new(format!("malformed frame: {e}")))?;
    validate(raw, config)
}

/// Validates an already-decoded raw frame.
pub fn validate(raw: RawClientFrame, config: &Config) -> Result<ClientFrame, ValidationError> {
    match raw {
        RawClientFrame::JoinRoom { room_id, user_id, client_id, user_info } => {
            check_id("roomId", &room_id, config)?;
            check_id("userId", &user_id, config)?;
            check_id("clientId", &client_id, config)?;
            Ok(ClientFrame::JoinRoom { room_id, user_id, client_id, user_info })
        }
        RawClientFrame::LeaveRoom { room_id, client_id } => {
            check_id("roomId", &room_id, config)?;
            check_id("clientId", &client_id, config)?;
            Ok(ClientFrame::LeaveRoom { room_id, client_id })
        }
        RawClientFrame::OtOp { room_id, client_id, operation } => {
            check_id("roomId", &room_id, config)?;
            check_id("clientId", &client_id, config)?;
            let op = validate_operation(operation, &client_id, config)?;
            Ok(ClientFrame::OtOp { room_id, client_id, operation: op })
        }
        RawClientFrame::CursorUpdate { room_id, client_id, cursor } => {
            check_id("roomId", &room_id, config)?;
            check_id("clientId", &client_id, config)?;
            if cursor.line < 0 {
                return Err(ValidationError::field("cursor.line must be >= 0", "cursor.line"));
            }
            if cursor.column < 0 {
                return Err(ValidationError::field("cursor.column must be >= 0", "cursor.column"));
            }
            Ok(ClientFrame::CursorUpdate {
                room_id,
                client_id,
                cursor: Cursor { line: cursor.line as u64, column: cursor.column as u64 },
            })
        }
        RawClientFrame::SyncState { room_id, client_id, from_version } => {
            check_id("roomId", &room_id, config)?;
            check_id("clientId", &client_id, config)?;
            if from_version < 0 {
                return Err(ValidationError::field("fromVersion must be >= 0", "fromVersion"));
            }
            Ok(ClientFrame::SyncState { room_id, client_id, from_version: from_version as u64 })
        }
        RawClientFrame::Ack { room_id, client_id, operation_id } => {
            check_id("roomId", &room_id, config)?;
            check_id("clientId", &client_id, config)?;
            Ok(ClientFrame::Ack { room_id, client_id, operation_id })
        }
    }
}

fn validate_operation(raw: super::frame::RawOperation, client_id: &str, config: &Config) -> Result<Operation, ValidationError> {
    let op_type = parse_op_type(&raw.op_type)
        .ok_or_else(|| ValidationError::field(format!("unknown operation type '{}'", raw.op_type), "operation.type"))?;

    if raw.position < 0 {
        return Err(ValidationError::field("operation.position must be >= 0", "operation.position"));
    }

    let content_chars = raw.content.chars().count();
    if content_chars > config.max_content_chars {
        return Err(ValidationError::field(
            format!("operation.content length {content_chars} exceeds max {}", config.max_content_chars),
            "operation.content",
        ));
    }

    if raw.base_version < 0 {
        return Err(ValidationError::field("operation.baseVersion must be >= 0", "operation.baseVersion"));
    }

    Ok(Operation {
        id: raw.id.unwrap_or_default(),
        op_type,
        position: raw.position as usize,
        content: raw.content,
        base_version: raw.base_version as u64,
        client_id: client_id.to_string(),
        user_id: String::new(),
    })
}

fn check_id(field: &'static str, value: &str, config: &Config) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::field(format!("{field} must not be empty"), field));
    }
    if value.chars().count() > config.max_id_len {
        return Err(ValidationError::field(format!("{field} exceeds max length {}", config.max_id_len), field));
    }
    Ok(())
}

/// Fills in `user_id` on a validated operation — the validator doesn't know
/// the submitter's `userId` (that lives on the `Session`, not the frame), so
/// the session layer calls this once it has looked the session up.
pub fn with_user_id(mut op: Operation, user_id: impl Into<String>) -> Operation {
    op.user_id = user_id.into();
    op
}

/// Assigns a server-generated fallback id when the client omitted one.
pub fn ensure_op_id(mut op: Operation, id_gen: &dyn crate::clock::IdGenerator) -> Operation {
    if op.id.is_empty() {
        op.id = id_gen.new_id();
    }
    op
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_room_id() {
        let config = Config::default();
        let raw = RawClientFrame::JoinRoom {
            room_id: "x".repeat(config.max_id_len + 1),
            user_id: "u".into(),
            client_id: "c".into(),
            user_info: None,
        };
        let err = validate(raw, &config).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("roomId"));
    }

    #[test]
    fn rejects_unknown_operation_type() {
        let config = Config::default();
        let raw = RawClientFrame::OtOp {
            room_id: "r".into(),
            client_id: "c".into(),
            operation: super::super::frame::RawOperation {
                id: Some("op1".into()),
                op_type: "replace".into(),
                position: 0,
                content: "x".into(),
                base_version: 0,
            },
        };
        let err = validate(raw, &config).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("operation.type"));
    }

    #[test]
    fn rejects_oversized_content() {
        let config = Config::default();
        let raw = RawClientFrame::OtOp {
            room_id: "r".into(),
            client_id: "c".into(),
            operation: super::super::frame::RawOperation {
                id: Some("op1".into()),
                op_type: "insert".into(),
                position: 0,
                content: "x".repeat(config.max_content_chars + 1),
                base_version: 0,
            },
        };
        let err = validate(raw, &config).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("operation.content"));
    }

    #[test]
    fn accepts_well_formed_ot_op() {
        let config = Config::default();
        let raw = RawClientFrame::OtOp {
            room_id: "room1".into(),
            client_id: "client1".into(),
            operation: super::super::frame::RawOperation {
                id: Some("op1".into()),
                op_type: "insert".into(),
                position: 3,
                content: "hi".into(),
                base_version: 0,
            },
        };
        let frame = validate(raw, &config).unwrap();
        match frame {
            ClientFrame::OtOp { operation, .. } => {
                assert_eq!(operation.op_type, OperationType::Insert);
                assert_eq!(operation.position, 3);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn validate_json_rejects_malformed() {
        let config = Config::default();
        let err = validate_json("{not json", &config).unwrap_err();
        assert!(err.message.contains("malformed"));
    }
}
