//! Recurrence expansion -- turns a schedule and a participant's events into
//! dated occurrence candidates.
//!
//! All arithmetic runs on local wall-clock date-times in the request zone.
//! Instants only appear when a candidate is compared against the window or
//! the schedule's `starts_on`/`ends_on` bounds, and those comparisons go
//! through the configured [`crate::dst::DstPolicy`].

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::activity::{occurrence_guid, ScheduledActivity};
use crate::config::SchedulerConfig;
use crate::context::ScheduleContext;
use crate::dst::DstPolicy;
use crate::events::EventMap;
use crate::schedule::{Schedule, SchedulePlan, ScheduleType};

/// The `[from, to]` range a request asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Window { from, to }
    }

    /// `[context.now, context.window_end]`.
    pub fn of(context: &ScheduleContext) -> Self {
        Window {
            from: context.now,
            to: context.window_end,
        }
    }
}

/// Select the plan's schedule for this participant and expand it.
///
/// Returns nothing when no criteria match.
pub fn expand_plan(
    plan: &SchedulePlan,
    events: &EventMap,
    window: Window,
    context: &ScheduleContext,
    config: &SchedulerConfig,
) -> Vec<ScheduledActivity> {
    match plan.strategy().select(&context.criteria) {
        Some(schedule) => expand(plan.guid(), schedule, events, window, context, config),
        None => {
            debug!(plan = plan.guid(), owner_id = %context.owner_id, "no schedule matches participant");
            Vec::new()
        }
    }
}

/// Expand one schedule into sorted occurrence candidates.
///
/// Candidates are ordered by `(local_scheduled_on, activity.label, guid)`.
/// The result depends only on the arguments.
pub fn expand(
    plan_guid: &str,
    schedule: &Schedule,
    events: &EventMap,
    window: Window,
    context: &ScheduleContext,
    config: &SchedulerConfig,
) -> Vec<ScheduledActivity> {
    let Some(anchor) = resolve_anchor(schedule, events, &context.zone, config) else {
        debug!(plan = plan_guid, schedule = schedule.label(), "anchor event has not happened");
        return Vec::new();
    };

    let times = match schedule.schedule_type() {
        ScheduleType::Once => once_times(schedule, anchor, window, context, config),
        ScheduleType::Recurring => recurring_times(schedule, anchor, window, context, config),
    };

    let mut occurrences: Vec<ScheduledActivity> = times
        .iter()
        .flat_map(move |&local| {
            schedule
                .activities()
                .iter()
                .filter(move |activity| activity.is_available_to(&context.criteria.client))
                .map(move |activity| ScheduledActivity {
                    guid: occurrence_guid(plan_guid, &activity.guid, local),
                    owner_id: context.owner_id.clone(),
                    schedule_plan_guid: plan_guid.to_string(),
                    activity: activity.clone(),
                    local_scheduled_on: Some(local),
                    local_expires_on: local_expires_on(schedule, local),
                    started_on: None,
                    finished_on: None,
                    persistent: schedule.is_persistent(),
                    time_zone: Some(context.zone),
                })
        })
        .collect();
    occurrences.sort_by(ScheduledActivity::display_order);

    debug!(
        plan = plan_guid,
        schedule = schedule.label(),
        times = times.len(),
        occurrences = occurrences.len(),
        "expanded schedule"
    );
    occurrences
}

/// The first present event of the schedule's `eventId` list, as local time.
fn resolve_anchor(schedule: &Schedule, events: &EventMap, zone: &Tz, config: &SchedulerConfig) -> Option<NaiveDateTime> {
    schedule
        .anchor_keys(&config.default_event_key)
        .into_iter()
        .find_map(|key| events.get(key))
        .map(|instant| instant.with_timezone(zone).naive_local())
}

fn local_expires_on(schedule: &Schedule, local: NaiveDateTime) -> Option<NaiveDateTime> {
    if schedule.is_persistent() {
        return None;
    }
    schedule.expires().and_then(|expires| expires.add_to(local))
}

/// Outcome of checking one candidate time.
enum Candidate {
    Keep,
    Skip,
    /// Past the schedule's `ends_on`; nothing later can be kept either.
    Done,
}

fn check_candidate(
    schedule: &Schedule,
    local: NaiveDateTime,
    window: Window,
    zone: &Tz,
    policy: DstPolicy,
) -> Candidate {
    let Some(instant) = policy.resolve(zone, local).map(|dt| dt.with_timezone(&Utc)) else {
        return Candidate::Skip;
    };
    if schedule.ends_on().is_some_and(|end| instant > end) {
        return Candidate::Done;
    }
    if !schedule.is_in_window(instant) {
        return Candidate::Skip;
    }
    if schedule.is_persistent() {
        return Candidate::Keep;
    }
    // Expiry instants always shift forward out of a gap.
    let expired = local_expires_on(schedule, local)
        .and_then(|expires| DstPolicy::ShiftForward.resolve(zone, expires))
        .is_some_and(|expires| expires.with_timezone(&Utc) < window.from);
    if expired {
        Candidate::Skip
    } else {
        Candidate::Keep
    }
}

fn once_times(
    schedule: &Schedule,
    anchor: NaiveDateTime,
    window: Window,
    context: &ScheduleContext,
    config: &SchedulerConfig,
) -> Vec<NaiveDateTime> {
    let Some(local) = schedule.delay().add_to(anchor) else {
        return Vec::new();
    };
    match check_candidate(schedule, local, window, &context.zone, config.dst_policy) {
        Candidate::Keep => vec![local],
        Candidate::Skip | Candidate::Done => Vec::new(),
    }
}

fn recurring_times(
    schedule: &Schedule,
    anchor: NaiveDateTime,
    window: Window,
    context: &ScheduleContext,
    config: &SchedulerConfig,
) -> Vec<NaiveDateTime> {
    let Some(interval) = schedule.interval() else {
        return Vec::new();
    };
    let window_end = window.to.with_timezone(&context.zone).naive_local();
    let minimum = context.minimum_per_schedule as usize;
    let cap = config.max_occurrences_per_schedule;

    let mut kept: Vec<NaiveDateTime> = Vec::new();
    let mut boundary = schedule.delay().add_to(anchor);

    'boundaries: while let Some(current) = boundary {
        for &time in schedule.times() {
            let local = current.date().and_time(time);
            if local > window_end && kept.len() >= minimum {
                break 'boundaries;
            }
            match check_candidate(schedule, local, window, &context.zone, config.dst_policy) {
                Candidate::Keep => kept.push(local),
                Candidate::Skip => {}
                Candidate::Done => break 'boundaries,
            }
            if local > window_end && kept.len() >= cap {
                break 'boundaries;
            }
        }
        boundary = interval.add_to(current);
    }

    // Keep the latest times so the window itself stays covered.
    if kept.len() > cap {
        kept.drain(..kept.len() - cap);
    }
    kept
}
