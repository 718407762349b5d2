//! Schedule definitions, activities, and the strategies that pick a schedule
//! for a participant.
//!
//! A [`Schedule`] can only be obtained through [`ScheduleBuilder::build`] (or
//! deserialization, which goes through the same path), so every schedule the
//! expander sees has already been validated.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::{select_best, AppVersions, ClientInfo, Criteria, CriteriaContext};
use crate::error::{Result, ScheduleError};
use crate::period::Period;
use crate::serde_ext::null_as_default;

/// What an activity points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActivityReference {
    #[serde(rename_all = "camelCase")]
    Task { identifier: String },
    #[serde(rename_all = "camelCase")]
    Survey {
        guid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identifier: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Compound { task_identifier: String },
}

/// One thing a participant is asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub guid: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_detail: Option<String>,
    pub reference: ActivityReference,
    #[serde(default, deserialize_with = "null_as_default")]
    pub min_app_versions: AppVersions,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_app_versions: AppVersions,
}

impl Activity {
    pub fn task(guid: impl Into<String>, label: impl Into<String>, identifier: impl Into<String>) -> Self {
        Activity::new(
            guid,
            label,
            ActivityReference::Task {
                identifier: identifier.into(),
            },
        )
    }

    pub fn survey(guid: impl Into<String>, label: impl Into<String>, survey_guid: impl Into<String>) -> Self {
        Activity::new(
            guid,
            label,
            ActivityReference::Survey {
                guid: survey_guid.into(),
                identifier: None,
            },
        )
    }

    pub fn new(guid: impl Into<String>, label: impl Into<String>, reference: ActivityReference) -> Self {
        Activity {
            guid: guid.into(),
            label: label.into(),
            label_detail: None,
            reference,
            min_app_versions: AppVersions::new(),
            max_app_versions: AppVersions::new(),
        }
    }

    pub fn with_min_app_version(mut self, os: impl Into<String>, version: u32) -> Self {
        self.min_app_versions.insert(os.into(), version);
        self
    }

    pub fn with_max_app_version(mut self, os: impl Into<String>, version: u32) -> Self {
        self.max_app_versions.insert(os.into(), version);
        self
    }

    /// Whether the client's app version falls inside this activity's bounds.
    /// Clients that do not report a version always pass.
    pub fn is_available_to(&self, client: &ClientInfo) -> bool {
        let Some((os, version)) = client.os_and_version() else {
            return true;
        };
        let above_min = self.min_app_versions.get(os).is_none_or(|&min| version >= min);
        let below_max = self.max_app_versions.get(os).is_none_or(|&max| version <= max);
        above_min && below_max
    }

    fn validate(&self, index: usize) -> Result<()> {
        validate_guid(&format!("activities[{}].guid", index), &self.guid)?;
        if self.label.trim().is_empty() {
            return Err(ScheduleError::Invalid(format!(
                "activities[{}].label cannot be blank",
                index
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    Once,
    Recurring,
}

/// A validated recurrence definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ScheduleBuilder")]
pub struct Schedule {
    label: String,
    schedule_type: ScheduleType,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<Period>,
    times: Vec<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delay: Option<Period>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<Period>,
    persistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    starts_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ends_on: Option<DateTime<Utc>>,
    activities: Vec<Activity>,
}

impl Schedule {
    pub fn builder(schedule_type: ScheduleType) -> ScheduleBuilder {
        ScheduleBuilder {
            schedule_type: Some(schedule_type),
            ..ScheduleBuilder::default()
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn schedule_type(&self) -> ScheduleType {
        self.schedule_type
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    /// Event keys that can anchor this schedule, in priority order.
    /// Falls back to `default_key` when the schedule names none.
    pub fn anchor_keys<'a>(&'a self, default_key: &'a str) -> Vec<&'a str> {
        match &self.event_id {
            Some(ids) => split_event_ids(ids),
            None => vec![default_key],
        }
    }

    pub fn interval(&self) -> Option<Period> {
        self.interval
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    pub fn delay(&self) -> Period {
        self.delay.unwrap_or(Period::ZERO)
    }

    pub fn expires(&self) -> Option<Period> {
        self.expires
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn starts_on(&self) -> Option<DateTime<Utc>> {
        self.starts_on
    }

    pub fn ends_on(&self) -> Option<DateTime<Utc>> {
        self.ends_on
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    /// Whether an instant falls inside the schedule's `[starts_on, ends_on]` bounds.
    pub fn is_in_window(&self, instant: DateTime<Utc>) -> bool {
        self.starts_on.is_none_or(|start| instant >= start)
            && self.ends_on.is_none_or(|end| instant <= end)
    }
}

/// Mutable schedule definition. Call [`ScheduleBuilder::build`] to validate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBuilder {
    #[serde(default)]
    label: String,
    #[serde(default)]
    schedule_type: Option<ScheduleType>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    interval: Option<Period>,
    #[serde(default, deserialize_with = "null_as_default")]
    times: Vec<NaiveTime>,
    #[serde(default)]
    delay: Option<Period>,
    #[serde(default)]
    expires: Option<Period>,
    #[serde(default)]
    persistent: bool,
    #[serde(default)]
    starts_on: Option<DateTime<Utc>>,
    #[serde(default)]
    ends_on: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    activities: Vec<Activity>,
}

impl ScheduleBuilder {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn interval(mut self, interval: Period) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn time(mut self, time: NaiveTime) -> Self {
        self.times.push(time);
        self
    }

    /// Replace all times of day. The slice is copied.
    pub fn times(mut self, times: &[NaiveTime]) -> Self {
        self.times = times.to_vec();
        self
    }

    pub fn delay(mut self, delay: Period) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn expires(mut self, expires: Period) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn starts_on(mut self, starts_on: DateTime<Utc>) -> Self {
        self.starts_on = Some(starts_on);
        self
    }

    pub fn ends_on(mut self, ends_on: DateTime<Utc>) -> Self {
        self.ends_on = Some(ends_on);
        self
    }

    pub fn activity(mut self, activity: Activity) -> Self {
        self.activities.push(activity);
        self
    }

    /// Replace all activities. The slice is copied.
    pub fn activities(mut self, activities: &[Activity]) -> Self {
        self.activities = activities.to_vec();
        self
    }

    /// Validate and freeze the definition.
    ///
    /// # Errors
    /// Returns `ScheduleError::Invalid` when the type is missing, a ONCE
    /// schedule has an interval, a RECURRING schedule lacks an interval of at
    /// least one day or any times of day, there are no activities, a sub-day
    /// delay is combined with times of day, or `ends_on` is less than an hour
    /// after `starts_on`.
    pub fn build(self) -> Result<Schedule> {
        let schedule_type = self
            .schedule_type
            .ok_or_else(|| invalid("scheduleType is required"))?;

        match schedule_type {
            ScheduleType::Once => {
                if self.interval.is_some() {
                    return Err(invalid("executing once should not have an interval"));
                }
            }
            ScheduleType::Recurring => {
                let interval = self
                    .interval
                    .ok_or_else(|| invalid("recurring schedules require an interval"))?;
                if interval.is_shorter_than_day() {
                    return Err(invalid("interval must be at least one day"));
                }
                if self.times.is_empty() {
                    return Err(invalid("times are required for interval-based schedules"));
                }
                if let Some(delay) = self.delay {
                    if !delay.is_zero() && delay.is_shorter_than_day() {
                        return Err(invalid(
                            "delay is less than one day, and times of day are also set for this schedule, which is ambiguous",
                        ));
                    }
                }
            }
        }

        if let Some(ids) = &self.event_id {
            if split_event_ids(ids).is_empty() {
                return Err(invalid("eventId cannot be blank"));
            }
        }

        if let (Some(start), Some(end)) = (self.starts_on, self.ends_on) {
            let earliest_end = start
                .checked_add_signed(Duration::hours(1))
                .ok_or_else(|| invalid("startsOn is out of range"))?;
            if end < earliest_end {
                return Err(invalid("endsOn should be at least an hour after the startsOn time"));
            }
        }

        if self.activities.is_empty() {
            return Err(invalid("activities are required"));
        }
        for (index, activity) in self.activities.iter().enumerate() {
            activity.validate(index)?;
        }

        let mut times = self.times;
        times.sort();
        times.dedup();

        Ok(Schedule {
            label: self.label,
            schedule_type,
            event_id: self.event_id,
            interval: self.interval,
            times,
            delay: self.delay,
            expires: self.expires,
            persistent: self.persistent,
            starts_on: self.starts_on,
            ends_on: self.ends_on,
            activities: self.activities,
        })
    }
}

impl TryFrom<ScheduleBuilder> for Schedule {
    type Error = ScheduleError;

    fn try_from(builder: ScheduleBuilder) -> Result<Self> {
        builder.build()
    }
}

/// A (criteria, schedule) alternative inside a criteria strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleCriteria {
    #[serde(default)]
    pub criteria: Criteria,
    pub schedule: Schedule,
}

impl ScheduleCriteria {
    pub fn new(criteria: Criteria, schedule: Schedule) -> Self {
        ScheduleCriteria { criteria, schedule }
    }
}

/// How a plan picks the schedule for a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScheduleStrategy {
    /// Everyone gets the same schedule.
    #[serde(rename = "SimpleScheduleStrategy")]
    Simple { schedule: Schedule },
    /// The most specific matching alternative wins; ties go to declaration order.
    #[serde(rename = "CriteriaScheduleStrategy")]
    Criteria {
        #[serde(
            rename = "scheduleCriteria",
            default,
            deserialize_with = "null_as_default"
        )]
        schedule_criteria: Vec<ScheduleCriteria>,
    },
}

impl ScheduleStrategy {
    pub fn simple(schedule: Schedule) -> Self {
        ScheduleStrategy::Simple { schedule }
    }

    pub fn criteria(schedule_criteria: Vec<ScheduleCriteria>) -> Self {
        ScheduleStrategy::Criteria { schedule_criteria }
    }

    /// Select the schedule for a participant, if any applies.
    pub fn select(&self, context: &CriteriaContext) -> Option<&Schedule> {
        match self {
            ScheduleStrategy::Simple { schedule } => Some(schedule),
            ScheduleStrategy::Criteria { schedule_criteria } => select_best(
                schedule_criteria
                    .iter()
                    .map(|entry| (&entry.criteria, &entry.schedule)),
                context,
            ),
        }
    }

    /// Every schedule this strategy could select, in declaration order.
    pub fn all_possible_schedules(&self) -> Vec<&Schedule> {
        match self {
            ScheduleStrategy::Simple { schedule } => vec![schedule],
            ScheduleStrategy::Criteria { schedule_criteria } => {
                schedule_criteria.iter().map(|entry| &entry.schedule).collect()
            }
        }
    }

    fn validate(&self, declared_groups: Option<&BTreeSet<String>>) -> Result<()> {
        if let ScheduleStrategy::Criteria { schedule_criteria } = self {
            for entry in schedule_criteria {
                entry.criteria.validate(declared_groups)?;
            }
        }
        Ok(())
    }
}

/// A named rule set. Its guid is part of every occurrence identity it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawSchedulePlan")]
pub struct SchedulePlan {
    guid: String,
    label: String,
    strategy: ScheduleStrategy,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedulePlan {
    guid: String,
    #[serde(default)]
    label: String,
    strategy: ScheduleStrategy,
}

impl TryFrom<RawSchedulePlan> for SchedulePlan {
    type Error = ScheduleError;

    fn try_from(raw: RawSchedulePlan) -> Result<Self> {
        SchedulePlan::new(raw.guid, raw.label, raw.strategy)
    }
}

impl SchedulePlan {
    /// # Errors
    /// Rejects a blank guid, a guid containing `:`, and criteria that can
    /// never match (see [`Criteria::validate`]).
    pub fn new(guid: impl Into<String>, label: impl Into<String>, strategy: ScheduleStrategy) -> Result<Self> {
        let guid = guid.into();
        validate_guid("guid", &guid)?;
        strategy.validate(None)?;
        Ok(SchedulePlan {
            guid,
            label: label.into(),
            strategy,
        })
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn strategy(&self) -> &ScheduleStrategy {
        &self.strategy
    }

    /// Check every criteria group against the study's declared data groups.
    pub fn validate_data_groups(&self, declared_groups: &BTreeSet<String>) -> Result<()> {
        self.strategy.validate(Some(declared_groups))
    }
}

fn split_event_ids(ids: &str) -> Vec<&str> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect()
}

fn validate_guid(field: &str, guid: &str) -> Result<()> {
    if guid.trim().is_empty() {
        return Err(invalid(&format!("{} cannot be blank", field)));
    }
    if guid.contains(':') {
        return Err(invalid(&format!("{} cannot contain ':'", field)));
    }
    Ok(())
}

fn invalid(message: &str) -> ScheduleError {
    ScheduleError::Invalid(message.to_string())
}
