use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};

/// Half open interval `[from, until)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    from: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, CoreError> {
        let range = TimeRange { from, until };
        if !range.is_valid() {
            return Err(CoreError::InvalidRange(format!(
                "from {} is after to {}",
                from.to_rfc3339(),
                until.to_rfc3339()
            )));
        }
        Ok(range)
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    pub fn is_valid(&self) -> bool {
        self.from <= self.until
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.until
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from <= timestamp && timestamp < self.until
    }

    pub fn is_larger_than(&self, duration: Duration) -> bool {
        self.until - self.from > duration
    }
}
