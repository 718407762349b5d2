//! DST transition policies for local wall-clock occurrences.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for resolving a stored local time that does not map to exactly
/// one instant in the request's zone.
///
/// Ambiguous times (the repeated hour at fall-back) always resolve to the
/// earlier instant. The policy only decides what happens in the gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Local times in the DST gap (e.g. 2:30 AM during spring forward) have no instant.
    Skip,
    /// Shift to the same wall-clock offset past the gap (2:30 AM becomes 3:30 AM).
    #[default]
    ShiftForward,
}

impl DstPolicy {
    /// Resolve a local date-time in `zone` to an instant.
    pub fn resolve(self, zone: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
        match zone.from_local_datetime(&local) {
            LocalResult::Single(instant) => Some(instant),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => match self {
                DstPolicy::Skip => None,
                // Gaps are at most an hour in every zone chrono-tz ships with
                // a DST rule, except a few historical two-hour jumps.
                DstPolicy::ShiftForward => (1..=2)
                    .filter_map(|hours| local.checked_add_signed(Duration::hours(hours)))
                    .find_map(|shifted| zone.from_local_datetime(&shifted).earliest()),
            },
        }
    }
}
