/// Consecutive actuation failure counter.
#[derive(Debug, Clone)]
pub struct RetryEscalation {
    retries: u32,
    threshold: u32,
}

impl RetryEscalation {
    pub fn new(threshold: u32) -> Self {
        Self {
            retries: 0,
            threshold,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_failure(&mut self) {
        self.retries = self.retries.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.retries = 0;
    }

    /// True on every call while the counter is above the threshold, not only
    /// when it first crosses it.
    pub fn should_escalate(&self) -> bool {
        self.retries > self.threshold
    }
}
