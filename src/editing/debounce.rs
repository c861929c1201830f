//! Quiescence-based debouncing for reflow and snapshots
//!
//! Time is passed in explicitly so the host event loop (a browser timer or
//! a native tick) stays in charge of scheduling.

/// Coalesces bursts of events into one action after a quiet period
#[derive(Debug, Clone)]
pub struct Debouncer {
    interval_ms: u64,
    last_event: Option<u64>,
}

impl Debouncer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_event: None,
        }
    }

    /// Record an event at `now_ms`, restarting the quiet period
    pub fn poke(&mut self, now_ms: u64) {
        self.last_event = Some(now_ms);
    }

    /// Whether events are waiting for the quiet period to elapse
    pub fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    /// Whether the burst has settled at `now_ms`
    pub fn is_ready(&self, now_ms: u64) -> bool {
        match self.last_event {
            Some(at) => now_ms.saturating_sub(at) >= self.interval_ms,
            None => false,
        }
    }

    /// Consume the pending burst if it has settled
    pub fn take_ready(&mut self, now_ms: u64) -> bool {
        if self.is_ready(now_ms) {
            self.last_event = None;
            true
        } else {
            false
        }
    }

    /// Drop any pending burst without acting on it
    pub fn clear(&mut self) {
        self.last_event = None;
    }
}

/// Get current timestamp in milliseconds
pub fn current_timestamp() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        js_sys::Date::now() as u64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_is_never_ready() {
        let debouncer = Debouncer::new(100);
        assert!(!debouncer.is_pending());
        assert!(!debouncer.is_ready(10_000));
    }

    #[test]
    fn test_burst_coalesces() {
        let mut debouncer = Debouncer::new(100);
        debouncer.poke(0);
        debouncer.poke(50);
        debouncer.poke(120);
        assert!(!debouncer.take_ready(200));
        assert!(debouncer.take_ready(220));
        assert!(!debouncer.is_pending());
        assert!(!debouncer.take_ready(1_000));
    }

    #[test]
    fn test_clock_going_backwards() {
        let mut debouncer = Debouncer::new(100);
        debouncer.poke(500);
        assert!(!debouncer.is_ready(400));
    }
}
