//! Real-time collaborative editing core for CodeDojo.
//!
//! Implements the Operational Transformation engine, room manager, and
//! session/protocol layer that let many clients edit a shared text document
//! concurrently and converge to identical content. Authentication, the HTTP
//! surface, and the durable store are external collaborators; this crate
//! consumes them through the narrow [`persistence::Persistence`] and
//! [`transport::Transport`] ports.
//!
//! ```text
//! Transport -> validate -> Session -> RoomManager -> OT engine
//!                                         |
//!                                    Persistence (async, non-fatal)
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ot;
pub mod persistence;
pub mod protocol;
pub mod room;
pub mod session;
pub mod transport;

pub use clock::{Clock, FakeClock, IdGenerator, SystemClock, UuidIdGenerator};
pub use config::Config;
pub use error::{CollabError, ErrorCode, PersistenceError, RoomError, TransformError, ValidationError};
pub use ot::{DocumentState, Operation, OperationType};
pub use persistence::{InMemoryPersistence, Persistence, SharedPersistence};
pub use protocol::{ClientFrame, ServerFrame};
pub use room::{JoinOutcome, RoomManager, SyncStateOutcome};
pub use session::{Session, SessionState};
