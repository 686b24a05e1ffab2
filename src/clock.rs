//! Clock and ID-generation ports.
//!
//! The OT engine and room manager never call `Instant::now()` or a random
//! source directly; they go through these traits so tests can supply
//! deterministic fakes (a recurring need once rate limiting and the reaper
//! enter the picture).

use std::time::{Duration, Instant};

/// A monotonic clock source.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Production clock backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A fake clock for tests: time only advances when told to.
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: std::sync::Arc<parking_lot::Mutex<Instant>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { inner: std::sync::Arc::new(parking_lot::Mutex::new(Instant::now())) }
    }

    pub fn advance(&self, d: Duration) {
        *self.inner.lock() += d;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.inner.lock()
    }
}

/// Generates server-assigned fallback operation IDs, used only when a client
/// omits one.
pub trait IdGenerator: Send + Sync + 'static {
    fn new_id(&self) -> String;
}

/// Production ID generator backed by UUIDv4.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
