//! Persisted identity of an embedded guest process.
//!
//! A process id alone is not an identity: once a process exits, the OS may
//! hand the same pid to an unrelated program.  The record therefore also keeps
//! the process start time, and reconciliation only acts on a live process
//! whose start time still matches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::window::ProcessId;

/// `(pid, name, start time)` written to disk for every embedded guest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedProcessRecord {
    pub process_id: ProcessId,
    pub process_name: String,
    /// Process creation time in milliseconds since the Unix epoch.
    pub start_time_ms: u64,
}

impl TrackedProcessRecord {
    /// Returns `true` if `start_time_ms` is within `tolerance` of the recorded
    /// start time.
    pub fn same_start_time(&self, start_time_ms: u64, tolerance: Duration) -> bool {
        self.start_time_ms.abs_diff(start_time_ms) <= tolerance.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TrackedProcessRecord {
        TrackedProcessRecord {
            process_id: 123,
            process_name: "notepad.exe".to_string(),
            start_time_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_same_start_time_within_tolerance() {
        let r = record();
        let tol = Duration::from_millis(1000);
        assert!(r.same_start_time(1_700_000_000_000, tol));
        assert!(r.same_start_time(1_700_000_000_999, tol));
        assert!(r.same_start_time(1_699_999_999_000, tol));
        assert!(!r.same_start_time(1_700_000_001_001, tol));
    }

    #[test]
    fn test_record_json_round_trip() {
        let r = record();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"process_id\":123"));
        let back: TrackedProcessRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
