/// Elapsed-time accumulator for a detection session.
///
/// Times are milliseconds on any monotonic timeline the caller chooses; the
/// controller uses milliseconds since it was constructed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionClock {
    origin_millis: Option<u64>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, now_millis: u64) {
        self.origin_millis = Some(now_millis);
    }

    pub fn stop(&mut self) {
        self.origin_millis = None;
    }

    pub fn is_running(&self) -> bool {
        self.origin_millis.is_some()
    }

    pub fn elapsed_secs(&self, now_millis: u64) -> u64 {
        match self.origin_millis {
            Some(origin) => now_millis.saturating_sub(origin) / 1000,
            None => 0,
        }
    }

    /// `MM:SS`, zero padded. Minutes keep counting past 59.
    pub fn elapsed_label(&self, now_millis: u64) -> String {
        let elapsed = self.elapsed_secs(now_millis);
        format!("{:02}:{:02}", elapsed / 60, elapsed % 60)
    }
}
