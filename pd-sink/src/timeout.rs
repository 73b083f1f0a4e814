//! One-shot timeout over a wrapping millisecond clock.

use crate::{Duration, Instant};

/// An expiry further than this in the past is considered to lie in the
/// future instead, which keeps comparisons meaningful across the 32-bit
/// counter wraparound.
const EXPIRY_WINDOW: u32 = 1 << 27;

/// One-shot timer.
///
/// Starting a timer overwrites the previous one; expiry is reported once
/// and cancels the timer.
pub struct Timeout {
    now: Instant,
    expiry: Option<Instant>,
}

impl Timeout {
    pub fn new() -> Self {
        Self {
            now: Instant::from_ticks(0),
            expiry: None,
        }
    }

    /// Updates the current time.
    pub fn update(&mut self, now: Instant) {
        self.now = now;
    }

    /// Starts a timeout some duration in the future.
    pub fn start(&mut self, duration: Duration) {
        self.expiry = Some(Instant::from_ticks(
            self.now.ticks().wrapping_add(duration.ticks()),
        ));
    }

    /// Cancels the timeout.
    pub fn cancel(&mut self) {
        self.expiry = None;
    }

    /// Tests whether the timeout has expired.
    pub fn is_expired(&mut self) -> bool {
        let Some(expiry) = self.expiry else {
            return false;
        };

        let expired = self.now.ticks().wrapping_sub(expiry.ticks()) < EXPIRY_WINDOW;

        if expired {
            self.cancel();
        }

        expired
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::new()
    }
}
