//! Scheduled activities (occurrences), their identity, and derived status.
//!
//! Occurrences store local wall-clock times only. The zone that interprets
//! them is attached per request via [`ScheduledActivity::time_zone`] and is
//! never persisted, so changing zones between requests never shifts the
//! wall-clock value.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::schedule::Activity;

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Status of an occurrence. Always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Scheduled,
    Available,
    Started,
    Finished,
    Expired,
    Deleted,
}

impl ActivityStatus {
    /// Whether participants see occurrences in this status when reading their schedule.
    pub fn is_visible(self) -> bool {
        matches!(
            self,
            ActivityStatus::Scheduled | ActivityStatus::Available | ActivityStatus::Started
        )
    }
}

/// Deterministic identity of an occurrence.
///
/// Format: `{planGuid}:{activityGuid}:{YYYY-MM-DDTHH:MM:SS}`. Neither guid may
/// contain `:`, which schedule and plan validation guarantee.
pub fn occurrence_guid(plan_guid: &str, activity_guid: &str, local_scheduled_on: NaiveDateTime) -> String {
    format!(
        "{}:{}:{}",
        plan_guid,
        activity_guid,
        local_scheduled_on.format(LOCAL_FORMAT)
    )
}

/// Split an identity produced by [`occurrence_guid`] back into its parts.
pub fn parse_occurrence_guid(guid: &str) -> Option<(&str, &str, NaiveDateTime)> {
    let mut parts = guid.splitn(3, ':');
    let plan = parts.next().filter(|p| !p.is_empty())?;
    let activity = parts.next().filter(|a| !a.is_empty())?;
    let local = NaiveDateTime::parse_from_str(parts.next()?, LOCAL_FORMAT).ok()?;
    Some((plan, activity, local))
}

/// One dated instance of an activity for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledActivity {
    pub guid: String,
    pub owner_id: String,
    pub schedule_plan_guid: String,
    pub activity: Activity,
    pub local_scheduled_on: Option<NaiveDateTime>,
    pub local_expires_on: Option<NaiveDateTime>,
    pub started_on: Option<DateTime<Utc>>,
    pub finished_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub persistent: bool,
    /// Zone of the request that last touched this record. Not persisted.
    #[serde(skip)]
    pub time_zone: Option<Tz>,
}

impl ScheduledActivity {
    /// A submitted change: identity plus the participant-owned timestamps.
    pub fn progress(
        guid: impl Into<String>,
        started_on: Option<DateTime<Utc>>,
        finished_on: Option<DateTime<Utc>>,
    ) -> ProgressUpdate {
        ProgressUpdate {
            guid: guid.into(),
            started_on,
            finished_on,
        }
    }

    pub fn with_time_zone(mut self, zone: Tz) -> Self {
        self.time_zone = Some(zone);
        self
    }

    fn zone(&self) -> Tz {
        self.time_zone.unwrap_or(Tz::UTC)
    }

    /// Scheduled instant in the attached zone.
    pub fn scheduled_on(&self, policy: DstPolicy) -> Option<DateTime<Tz>> {
        let local = self.local_scheduled_on?;
        policy.resolve(&self.zone(), local)
    }

    /// Expiration instant in the attached zone.
    pub fn expires_on(&self, policy: DstPolicy) -> Option<DateTime<Tz>> {
        let local = self.local_expires_on?;
        policy.resolve(&self.zone(), local)
    }

    /// Derive the status at `now`.
    ///
    /// `now` is converted to a wall-clock time in the attached zone (UTC when
    /// none is attached) and compared to the stored local times.
    pub fn status(&self, now: DateTime<Utc>) -> ActivityStatus {
        match (self.started_on, self.finished_on, self.local_scheduled_on) {
            (None, Some(_), None) => return ActivityStatus::Deleted,
            (_, Some(_), _) => return ActivityStatus::Finished,
            (Some(_), None, _) => return ActivityStatus::Started,
            (None, None, None) => return ActivityStatus::Available,
            _ => {}
        }

        let local_now = now.with_timezone(&self.zone()).naive_local();
        match self.local_scheduled_on {
            Some(scheduled) if local_now < scheduled => ActivityStatus::Scheduled,
            _ => match self.local_expires_on {
                Some(expires) if local_now > expires => ActivityStatus::Expired,
                _ => ActivityStatus::Available,
            },
        }
    }

    /// Ascending by local scheduled time, then activity label, then identity.
    pub fn display_order(a: &ScheduledActivity, b: &ScheduledActivity) -> Ordering {
        a.local_scheduled_on
            .cmp(&b.local_scheduled_on)
            .then_with(|| a.activity.label.cmp(&b.activity.label))
            .then_with(|| a.guid.cmp(&b.guid))
    }

    /// Zone-aware, status-bearing projection for API responses.
    pub fn to_view(&self, now: DateTime<Utc>, policy: DstPolicy) -> ScheduledActivityView {
        ScheduledActivityView {
            guid: self.guid.clone(),
            schedule_plan_guid: self.schedule_plan_guid.clone(),
            activity: self.activity.clone(),
            scheduled_on: self.scheduled_on(policy).map(|dt| dt.fixed_offset()),
            expires_on: self.expires_on(policy).map(|dt| dt.fixed_offset()),
            started_on: self.started_on,
            finished_on: self.finished_on,
            persistent: self.persistent,
            status: self.status(now),
        }
    }
}

/// Participant-submitted progress on one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub guid: String,
    #[serde(default)]
    pub started_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_on: Option<DateTime<Utc>>,
}

impl From<&ScheduledActivity> for ProgressUpdate {
    fn from(activity: &ScheduledActivity) -> Self {
        ProgressUpdate {
            guid: activity.guid.clone(),
            started_on: activity.started_on,
            finished_on: activity.finished_on,
        }
    }
}

/// What callers see: absolute timestamps in the request zone plus status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledActivityView {
    pub guid: String,
    pub schedule_plan_guid: String,
    pub activity: Activity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_on: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<DateTime<Utc>>,
    pub persistent: bool,
    pub status: ActivityStatus,
}
