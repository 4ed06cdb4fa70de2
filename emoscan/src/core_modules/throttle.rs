use std::time::Duration;
use tokio::time::Instant;

/// Lets a repeated notification through at most once per cooldown window.
#[derive(Debug, Clone)]
pub struct Throttle {
    cooldown: Duration,
    last_fired: Option<Instant>,
}

impl Throttle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: None,
        }
    }

    /// Returns true, and starts a new window, when the previous firing is at
    /// least `cooldown` old.
    pub fn allow(&mut self, now: Instant) -> bool {
        let open = match self.last_fired {
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
            None => true,
        };
        if open {
            self.last_fired = Some(now);
        }
        open
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}
