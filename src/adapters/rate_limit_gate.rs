//! Process-global, forward-only "service awake at" timestamp.
//!
//! Advanced whenever the accrual client observes a 429; read before every
//! outbound request. A mutex-guarded compare-and-swap loop, translating the
//! source's `threadsafe.Time.SetIf`.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

pub struct RateLimitGate {
    awake_at: Mutex<DateTime<Utc>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self {
            awake_at: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn awake_at(&self) -> DateTime<Utc> {
        *self.awake_at.lock().expect("rate limit gate mutex poisoned")
    }

    /// Advance the gate to `candidate` iff it is later than the current
    /// value. Never regresses, even under concurrent callers.
    pub fn advance_to(&self, candidate: DateTime<Utc>) {
        let mut current = self.awake_at.lock().expect("rate limit gate mutex poisoned");
        if candidate > *current {
            *current = candidate;
        }
    }

    /// True iff the gate is currently in the future.
    pub fn is_blocked(&self) -> bool {
        Utc::now() < self.awake_at()
    }
}

impl Default for RateLimitGate {
    fn default() -> Self {
        Self::new()
    }
}
