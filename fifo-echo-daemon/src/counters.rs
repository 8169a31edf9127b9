use std::fmt;

/// Process-wide accumulators. Only the supervisor mutates them and they are
/// never reset.
#[derive(Debug, Default)]
pub struct Counters {
    messages: u64,
    bytes: u64,
    alarms: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one completed message of `bytes` bytes (terminator included).
    pub fn record_message(&mut self, bytes: u64) {
        self.messages += 1;
        self.bytes += bytes;
    }

    pub fn record_alarm(&mut self) {
        self.alarms += 1;
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            messages: self.messages,
            bytes: self.bytes,
            alarms: self.alarms,
        }
    }
}

/// Point-in-time copy of [`Counters`], safe to print or return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub messages: u64,
    pub bytes: u64,
    pub alarms: u64,
}

impl fmt::Display for CountersSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "msg: {}, bytes: {}, alarm count: {}",
            self.messages, self.bytes, self.alarms
        )
    }
}
