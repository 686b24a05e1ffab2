//! Operational Transformation engine: per-document state,
//! the pairwise transform rules, and the fold-transform `apply` operation.

pub mod document;
pub mod op;
pub mod transform;

pub use document::DocumentState;
pub use op::{HistoryEntry, Operation, OperationType};
pub use transform::transform as transform_pair;
