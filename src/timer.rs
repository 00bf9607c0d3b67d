//! Millisecond countdown timers driven from the host clock tick.

/// A countdown timer. The timer only advances while running and latches in the expired
/// state until stopped or restarted.
#[derive(Copy, Clone, Debug, Default)]
pub struct Timer {
    /// Timeout in milliseconds. Zero disables expiry.
    timeout: u32,
    /// Elapsed run time in milliseconds.
    elapsed: u32,
    /// Whether the timer is running.
    running: bool,
}

impl Timer {
    /// Create a new stopped `Timer` with the given timeout in milliseconds.
    pub fn new(timeout: u32) -> Timer {
        Timer {
            timeout,
            elapsed: 0,
            running: false,
        }
    }

    /// Change the timeout without disturbing the run state.
    pub fn set_timeout(&mut self, timeout: u32) {
        self.timeout = timeout;
    }

    /// Start (or restart) the timer from zero.
    pub fn start(&mut self) {
        self.elapsed = 0;
        self.running = true;
    }

    /// Stop the timer and clear any expiry.
    pub fn stop(&mut self) {
        self.elapsed = 0;
        self.running = false;
    }

    /// Advance the timer by the given number of milliseconds.
    pub fn clock(&mut self, ms: u32) {
        if self.running {
            self.elapsed = self.elapsed.saturating_add(ms);
        }
    }

    /// Whether the timer is currently running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the timer has run past its timeout.
    pub fn has_expired(&self) -> bool {
        self.running && self.timeout > 0 && self.elapsed >= self.timeout
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_expiry() {
        let mut t = Timer::new(100);
        assert!(!t.is_running());
        assert!(!t.has_expired());

        t.start();
        t.clock(60);
        assert!(t.is_running());
        assert!(!t.has_expired());

        t.clock(40);
        assert!(t.has_expired());

        t.start();
        assert!(!t.has_expired());
        t.clock(150);
        assert!(t.has_expired());

        t.stop();
        assert!(!t.has_expired());
    }

    #[test]
    fn test_zero_timeout_never_expires() {
        let mut t = Timer::new(0);
        t.start();
        t.clock(10_000);
        assert!(!t.has_expired());
    }

    #[test]
    fn test_stopped_does_not_advance() {
        let mut t = Timer::new(10);
        t.clock(100);
        assert!(!t.has_expired());
    }
}
