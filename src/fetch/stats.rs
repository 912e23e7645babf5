//! Aggregated fetch statistics

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters over logical requests
///
/// A logical request is one `visit`, however many attempts it took.
#[derive(Debug, Clone, Serialize)]
pub struct FetchStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,

    /// Every navigation attempt, including retries
    pub total_attempts: u64,
    pub retries: u64,

    pub last_activity: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

impl Default for FetchStats {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            total_attempts: 0,
            retries: 0,
            last_activity: None,
            started_at: Utc::now(),
        }
    }
}

impl FetchStats {
    pub(crate) fn record(&mut self, succeeded: bool, attempts: u32) {
        self.total_requests += 1;
        if succeeded {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        self.total_attempts += u64::from(attempts);
        self.retries += u64::from(attempts.saturating_sub(1));
        self.last_activity = Some(Utc::now());
    }

    /// Share of logical requests that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }
}
