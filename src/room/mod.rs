//! Room Manager: per-room state, rate limiting, backpressure,
//! presence, and the TTL reaper.

pub mod manager;
pub mod presence;
pub mod rate_limit;

pub use manager::{JoinOutcome, RoomManager, SyncStateOutcome};
pub use presence::{Participant, SessionHandle};
pub use rate_limit::SlidingWindowLimiter;
