//! The `Operation` type exchanged between clients and server.

use serde::{Deserialize, Serialize};

/// Discriminates an [`Operation`]'s edit kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    Delete,
    /// A transformed operation that was fully subsumed by a concurrent
    /// delete. Carried in history so version numbers stay dense; clients
    /// ignore its content.
    Noop,
}

/// A single insert/delete edit, as produced by a client or transformed by the
/// server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Opaque, client-chosen ID. Combined with `client_id` for dedup.
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// 0-based index into the document's `char` sequence.
    pub position: usize,
    /// Insert: text to insert. Delete: the text the client believed was
    /// there — only its length is authoritative for position math.
    pub content: String,
    pub base_version: u64,
    /// Stable identifier of the originating connection; the deterministic
    /// tiebreaker for same-position concurrent edits.
    pub client_id: String,
    /// Informational only; never authoritative for ordering.
    pub user_id: String,
}

impl Operation {
    /// Length of `content` in `char`s — the unit position math operates on
    /// throughout this crate (Unicode scalar values, which Rust's `char`
    /// indexing matches).
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }

    /// The half-open range `[position, position + content_len)` this
    /// operation touches. For inserts this is the range the new text lands
    /// in after application; for deletes it's the range removed.
    pub fn end(&self) -> usize {
        self.position + self.content_len()
    }

    pub fn is_insert(&self) -> bool {
        self.op_type == OperationType::Insert
    }

    pub fn is_delete(&self) -> bool {
        self.op_type == OperationType::Delete
    }

    /// Turns this operation into a history-carrying no-op: position and
    /// content are cleared but id/client/version-adjacent fields survive so
    /// broadcast + dedup bookkeeping is unaffected.
    pub fn into_noop(mut self) -> Self {
        self.op_type = OperationType::Noop;
        self.content.clear();
        self.position = 0;
        self
    }
}

/// An operation paired with the server version it was assigned after apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub operation: Operation,
    pub version: u64,
}
