use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Millisecond time source. The reducer never reads the wall clock itself;
/// callers pass `now_ms` in, taken from one of these.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Hand-advanced clock for tests and replays.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub const DEFAULT_STALL_WARNING_MS: u64 = 10_000;

/// The one "waiting for response" timer of a session. Arming it replaces any
/// earlier deadline.
#[derive(Debug, Clone, Copy)]
pub struct StallTimer {
    pub delay_ms: u64,
    deadline_ms: Option<u64>,
}

impl Default for StallTimer {
    fn default() -> Self {
        Self::new(DEFAULT_STALL_WARNING_MS)
    }
}

impl StallTimer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline_ms: None,
        }
    }

    pub fn arm(&mut self, now_ms: u64) {
        self.deadline_ms = Some(now_ms.saturating_add(self.delay_ms));
    }

    pub fn cancel(&mut self) {
        self.deadline_ms = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline_ms
    }

    /// Returns true exactly once per armed deadline.
    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(deadline) if deadline <= now_ms => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }
}
