//! `DocumentState`: per-room OT state and the `apply` operation.

use super::op::{HistoryEntry, Operation, OperationType};
use super::transform::transform;
use crate::error::TransformError;
use crate::metrics;

/// The authoritative state of one room's document.
#[derive(Debug, Clone)]
pub struct DocumentState {
    content: String,
    /// Version at or before which `history` has been truncated; ops with
    /// `version <= snapshot_version` are not retained in `history`.
    snapshot_version: u64,
    version: u64,
    /// Ops applied since `snapshot_version`, each carrying its post-apply
    /// version. `history[0].version == snapshot_version + 1`.
    history: Vec<HistoryEntry>,
    last_modified: std::time::SystemTime,
    last_modifier_user_id: Option<String>,
}

impl DocumentState {
    pub fn new() -> Self {
        Self::from_snapshot(0, String::new())
    }

    /// Build a document state resuming from a durable snapshot.
    pub fn from_snapshot(version: u64, content: String) -> Self {
        Self {
            content,
            snapshot_version: version,
            version,
            history: Vec::new(),
            last_modified: std::time::SystemTime::now(),
            last_modifier_user_id: None,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn last_modified(&self) -> std::time::SystemTime {
        self.last_modified
    }

    pub fn last_modifier_user_id(&self) -> Option<&str> {
        self.last_modifier_user_id.as_deref()
    }

    /// O(1) read of the current state.
    pub fn snapshot(&self) -> (u64, String) {
        (self.version, self.content.clone())
    }

    /// The central OT operation: fold-transform `op` against every
    /// concurrent op it hasn't seen, clamp, apply, and append to history.
    pub fn apply(&mut self, op: Operation) -> Result<(Operation, u64), TransformError> {
        let _timer = metrics::LatencyTimer::start();

        if op.base_version > self.version {
            return Err(TransformError::StaleBase {
                base_version: op.base_version,
                current_version: self.version,
            });
        }

        let concurrent = self.operations_since_version(op.base_version, None);
        let had_concurrent = !concurrent.is_empty();

        let mut t = op;
        for c in &concurrent {
            t = transform(&t, c);
        }

        t = self.clamp(t)?;

        self.apply_content_mutation(&t);

        self.version += 1;
        self.last_modified = std::time::SystemTime::now();
        if t.op_type != OperationType::Noop {
            self.last_modifier_user_id = Some(t.user_id.clone());
        }
        self.history.push(HistoryEntry { operation: t.clone(), version: self.version });

        metrics::record_operation(op_type_label(&t), "applied");
        if had_concurrent {
            metrics::record_conflict_resolved();
        }

        Ok((t, self.version))
    }

    /// Clamp the transformed op's position (and, for deletes, its range) to
    /// the bounds of the current content.
    fn clamp(&self, mut op: Operation) -> Result<Operation, TransformError> {
        let len = self.content.chars().count();
        if op.op_type == OperationType::Noop {
            return Ok(op);
        }

        if op.position > len {
            op.position = len;
        }

        if op.op_type == OperationType::Delete {
            let max_len = len.saturating_sub(op.position);
            let want_len = op.content_len();
            if want_len > max_len {
                op.content = op.content.chars().take(max_len).collect();
            }
            if op.content_len() == 0 {
                return Ok(op.into_noop());
            }
        }

        Ok(op)
    }

    fn apply_content_mutation(&mut self, op: &Operation) {
        match op.op_type {
            OperationType::Insert => {
                self.content = splice_insert(&self.content, op.position, &op.content);
            }
            OperationType::Delete => {
                self.content = splice_delete(&self.content, op.position, op.content_len());
            }
            OperationType::Noop => {}
        }
    }

    /// `history[fromVersion..version]`, optionally excluding a client's own
    /// operations (so a reconnecting client doesn't replay its own ops).
    pub fn operations_since(&self, from_version: u64, exclude_client_id: Option<&str>) -> Vec<Operation> {
        self.operations_since_version(from_version, exclude_client_id)
    }

    fn operations_since_version(&self, from_version: u64, exclude_client_id: Option<&str>) -> Vec<Operation> {
        // If `from_version` predates `snapshot_version`, the caller needs a
        // full snapshot resync; that decision lives in the room manager's
        // SYNC_STATE path, not here.
        self.history
            .iter()
            .filter(|e| e.version > from_version)
            .filter(|e| exclude_client_id.map_or(true, |cid| e.operation.client_id != cid))
            .map(|e| e.operation.clone())
            .collect()
    }

    pub fn snapshot_version(&self) -> u64 {
        self.snapshot_version
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drop history entries at or before `version`. Only valid to call once a
    /// durable snapshot at `>= version` has been confirmed.
    pub fn truncate_history_before(&mut self, version: u64) {
        if version <= self.snapshot_version {
            return;
        }
        self.history.retain(|e| e.version > version);
        self.snapshot_version = version;
    }
}

impl Default for DocumentState {
    fn default() -> Self {
        Self::new()
    }
}

fn op_type_label(op: &Operation) -> &'static str {
    match op.op_type {
        OperationType::Insert => "insert",
        OperationType::Delete => "delete",
        OperationType::Noop => "noop",
    }
}

fn splice_insert(content: &str, position: usize, text: &str) -> String {
    let mut chars: Vec<char> = content.chars().collect();
    let at = position.min(chars.len());
    let inserted: Vec<char> = text.chars().collect();
    chars.splice(at..at, inserted);
    chars.into_iter().collect()
}

fn splice_delete(content: &str, position: usize, len: usize) -> String {
    let mut chars: Vec<char> = content.chars().collect();
    let start = position.min(chars.len());
    let end = (start + len).min(chars.len());
    chars.drain(start..end);
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(client: &str, kind: OperationType, pos: usize, content: &str, base: u64) -> Operation {
        Operation {
            id: format!("{client}-{pos}"),
            op_type: kind,
            position: pos,
            content: content.into(),
            base_version: base,
            client_id: client.into(),
            user_id: format!("user-{client}"),
        }
    }

    #[test]
    fn single_client_insert_applies_in_order() {
        let mut doc = DocumentState::new();
        let (_, v) = doc.apply(op("c1", OperationType::Insert, 0, "Hello", 0)).unwrap();
        assert_eq!(v, 1);
        assert_eq!(doc.content(), "Hello");
    }

    #[test]
    fn concurrent_inserts_converge_regardless_of_submission_order() {
        // order a, b
        let mut doc_ab = DocumentState::new();
        doc_ab.apply(op("a", OperationType::Insert, 0, "A", 0)).unwrap();
        let (t, v) = doc_ab.apply(op("b", OperationType::Insert, 0, "B", 0)).unwrap();
        assert_eq!(t.position, 1);
        assert_eq!(v, 2);
        assert_eq!(doc_ab.content(), "AB");

        // order b, a
        let mut doc_ba = DocumentState::new();
        doc_ba.apply(op("b", OperationType::Insert, 0, "B", 0)).unwrap();
        let (t, v) = doc_ba.apply(op("a", OperationType::Insert, 0, "A", 0)).unwrap();
        assert_eq!(t.position, 0); // "a" wins tiebreak, stays at 0
        assert_eq!(v, 2);
        assert_eq!(doc_ba.content(), "AB");
    }

    #[test]
    fn insert_shifts_a_later_concurrent_delete() {
        let mut doc = DocumentState::from_snapshot(0, "hello world".into());
        doc.apply(op("c1", OperationType::Insert, 5, "XYZ", 0)).unwrap();
        assert_eq!(doc.content(), "helloXYZ world");
        let (_, v) = doc.apply(op("c2", OperationType::Delete, 6, "world", 0)).unwrap();
        assert_eq!(v, 2);
        assert_eq!(doc.content(), "helloXYZ");
    }

    #[test]
    fn overlapping_concurrent_deletes_clip_to_disjoint_remainder() {
        let mut doc = DocumentState::from_snapshot(0, "abcdef".into());
        doc.apply(op("c1", OperationType::Delete, 1, "bc", 0)).unwrap();
        assert_eq!(doc.content(), "adef");
        let (_, v) = doc.apply(op("c2", OperationType::Delete, 2, "cd", 0)).unwrap();
        assert_eq!(v, 2);
        assert_eq!(doc.content(), "aef");
    }

    #[test]
    fn stale_base_rejected() {
        let mut doc = DocumentState::new();
        let err = doc.apply(op("c1", OperationType::Insert, 0, "x", 5)).unwrap_err();
        assert_eq!(err, TransformError::StaleBase { base_version: 5, current_version: 0 });
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn operations_since_excludes_own_client() {
        let mut doc = DocumentState::new();
        doc.apply(op("a", OperationType::Insert, 0, "X", 0)).unwrap();
        doc.apply(op("b", OperationType::Insert, 0, "Y", 0)).unwrap();
        let since_a = doc.operations_since(0, Some("a"));
        assert_eq!(since_a.len(), 1);
        assert_eq!(since_a[0].client_id, "b");
    }

    #[test]
    fn truncate_then_snapshot_version_advances() {
        let mut doc = DocumentState::new();
        for i in 0..5 {
            doc.apply(op("a", OperationType::Insert, 0, &i.to_string(), doc.version())).unwrap();
        }
        assert_eq!(doc.history_len(), 5);
        doc.truncate_history_before(3);
        assert_eq!(doc.snapshot_version(), 3);
        assert_eq!(doc.history_len(), 2);
    }

    #[test]
    fn reconstructing_from_snapshot_and_history_matches_live_state() {
        let mut doc = DocumentState::new();
        doc.apply(op("a", OperationType::Insert, 0, "Hello", 0)).unwrap();
        doc.apply(op("a", OperationType::Insert, 5, " World", 1)).unwrap();
        let (snap_version, snap_content) = (0u64, String::new());
        let mut replay = DocumentState::from_snapshot(snap_version, snap_content);
        for e in doc.operations_since(0, None) {
            replay.apply(e).unwrap();
        }
        assert_eq!(replay.content(), doc.content());
        assert_eq!(replay.version(), doc.version());
    }
}
