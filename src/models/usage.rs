//! Usage reading model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot of request traffic since the previous successful reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReading {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Requests observed since the previous reading (non-negative)
    pub request_count: i64,
}

impl UsageReading {
    /// Create a reading taken now for the given count.
    pub fn taken_now(request_count: i64) -> Self {
        debug_assert!(request_count >= 0);
        Self {
            taken_at: Utc::now(),
            request_count,
        }
    }
}
