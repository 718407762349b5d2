//! Merges freshly expanded candidates with persisted occurrences.
//!
//! Reads materialize: the first [`Reconciler::get_occurrences`] call that
//! produces a candidate saves it. Identities are deterministic, so concurrent
//! readers converge on the same records instead of duplicating them.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::activity::{ProgressUpdate, ScheduledActivity};
use crate::config::SchedulerConfig;
use crate::context::ScheduleContext;
use crate::error::ReconcileError;
use crate::event_key::ENROLLMENT;
use crate::events::EventStore;
use crate::expander::{expand_plan, Window};
use crate::store::{ActivityStore, PlanSource};

#[derive(Clone)]
pub struct Reconciler {
    activities: Arc<dyn ActivityStore>,
    events: EventStore,
    plans: Arc<dyn PlanSource>,
    config: SchedulerConfig,
}

impl Reconciler {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        events: EventStore,
        plans: Arc<dyn PlanSource>,
        config: SchedulerConfig,
    ) -> Self {
        Reconciler {
            activities,
            events,
            plans,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    /// Occurrences for `[context.now, context.window_end]` across every plan,
    /// merged with what is already persisted and sorted for display.
    ///
    /// Only scheduled, available and started occurrences are returned.
    /// Finished, expired and deleted records stay persisted but are hidden.
    ///
    /// # Errors
    /// `ReconcileError::InvalidContext` when the window ends before `now` or
    /// reaches more than `max_window_days` past it. Store failures propagate.
    pub fn get_occurrences(&self, context: &ScheduleContext) -> Result<Vec<ScheduledActivity>, ReconcileError> {
        self.validate_context(context)?;
        let owner_id = context.owner_id.as_str();

        if self.config.publish_activities_retrieved {
            self.events.publish_activities_retrieved(owner_id, context.now)?;
        }
        let mut events = self.events.get_all(owner_id)?;
        if let Some(created_on) = context.account_created_on {
            events.entry(ENROLLMENT.to_string()).or_insert(created_on);
        }

        let window = Window::of(context);
        let mut seen = HashSet::new();
        let candidates: Vec<ScheduledActivity> = self
            .plans
            .schedule_plans()?
            .iter()
            .flat_map(|plan| expand_plan(plan, &events, window, context, &self.config))
            .filter(|candidate| seen.insert(candidate.guid.clone()))
            .collect();

        let guids: Vec<String> = candidates.iter().map(|c| c.guid.clone()).collect();
        let persisted = self.activities.batch_load(owner_id, &guids)?;

        let mut materialize = Vec::new();
        let mut merged = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match persisted.get(&candidate.guid) {
                Some(record) => merged.push(record.clone().with_time_zone(context.zone)),
                None => {
                    materialize.push(candidate.clone());
                    merged.push(candidate);
                }
            }
        }

        if !materialize.is_empty() {
            self.activities.batch_save(&materialize)?;
        }
        info!(
            owner_id,
            total = merged.len(),
            materialized = materialize.len(),
            "reconciled occurrences"
        );

        let mut visible: Vec<ScheduledActivity> = merged
            .into_iter()
            .filter(|a| a.status(context.now).is_visible())
            .collect();
        visible.sort_by(ScheduledActivity::display_order);
        Ok(visible)
    }

    /// Apply participant progress to already-materialized occurrences.
    ///
    /// Only `started_on` and `finished_on` are copied, and only when set.
    /// Entries with neither are ignored. Entries sharing a guid apply in
    /// submission order. Every record given a `finished_on` also publishes
    /// an activity-finished event.
    ///
    /// # Errors
    /// `ReconcileError::InvalidUpdate` for an entry without a guid, and
    /// `ReconcileError::NotFound` for a guid that was never materialized.
    /// Nothing is saved when any entry fails.
    pub fn update(&self, owner_id: &str, updates: &[ProgressUpdate]) -> Result<(), ReconcileError> {
        for (index, update) in updates.iter().enumerate() {
            if update.guid.trim().is_empty() {
                return Err(ReconcileError::InvalidUpdate(format!(
                    "scheduledActivities[{}].guid is required",
                    index
                )));
            }
        }

        let changes: Vec<&ProgressUpdate> = updates
            .iter()
            .filter(|u| u.started_on.is_some() || u.finished_on.is_some())
            .collect();
        if changes.is_empty() {
            return Ok(());
        }

        let guids: Vec<String> = changes.iter().map(|u| u.guid.clone()).collect();
        let mut persisted = self.activities.batch_load(owner_id, &guids)?;

        // Repeated guids apply in order to the same record, saved once.
        let mut touched: Vec<&str> = Vec::with_capacity(changes.len());
        let mut finished: HashSet<&str> = HashSet::new();
        for change in &changes {
            let Some(record) = persisted.get_mut(&change.guid) else {
                return Err(ReconcileError::NotFound(change.guid.clone()));
            };
            if let Some(started_on) = change.started_on {
                record.started_on = Some(started_on);
            }
            if let Some(finished_on) = change.finished_on {
                record.finished_on = Some(finished_on);
                finished.insert(change.guid.as_str());
            }
            if !touched.contains(&change.guid.as_str()) {
                touched.push(change.guid.as_str());
            }
        }

        let saves: Vec<ScheduledActivity> = touched
            .iter()
            .filter_map(|guid| persisted.remove(*guid))
            .collect();
        self.activities.batch_save(&saves)?;
        info!(owner_id, updated = saves.len(), "updated scheduled activities");

        for record in saves.iter().filter(|r| finished.contains(r.guid.as_str())) {
            self.events.publish_activity_finished(record)?;
        }
        Ok(())
    }

    /// Hard-delete every persisted occurrence for the owner. Returns the count.
    pub fn delete_all(&self, owner_id: &str) -> Result<usize, ReconcileError> {
        let records = self.activities.load_all(owner_id)?;
        if !records.is_empty() {
            self.activities.batch_delete(&records)?;
        }
        info!(owner_id, deleted = records.len(), "deleted scheduled activities");
        Ok(records.len())
    }

    /// Persisted occurrences scheduled in `[from, to]`, optionally for one activity.
    ///
    /// The range is read as wall-clock time in `zone`.
    ///
    /// # Errors
    /// `ReconcileError::InvalidRange` when `to` precedes `from` or the range
    /// spans more than twice `max_window_days`.
    pub fn get_activity_history(
        &self,
        owner_id: &str,
        activity_guid: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        zone: Tz,
    ) -> Result<Vec<ScheduledActivity>, ReconcileError> {
        if to < from {
            return Err(ReconcileError::InvalidRange(
                "scheduledOnStart must be before scheduledOnEnd".into(),
            ));
        }
        let max_days = i64::from(self.config.max_window_days) * 2;
        if to - from > Duration::days(max_days) {
            return Err(ReconcileError::InvalidRange(format!(
                "date range cannot exceed {} days",
                max_days
            )));
        }

        let local_from = from.with_timezone(&zone).naive_local();
        let local_to = to.with_timezone(&zone).naive_local();
        let mut history: Vec<ScheduledActivity> = self
            .activities
            .query(owner_id, local_from, local_to)?
            .into_iter()
            .filter(|a| activity_guid.is_none_or(|guid| a.activity.guid == guid))
            .map(|a| a.with_time_zone(zone))
            .collect();
        history.sort_by(ScheduledActivity::display_order);

        debug!(owner_id, count = history.len(), "loaded activity history");
        Ok(history)
    }

    fn validate_context(&self, context: &ScheduleContext) -> Result<(), ReconcileError> {
        if context.owner_id.trim().is_empty() {
            return Err(ReconcileError::InvalidContext("ownerId is required".into()));
        }
        if context.window_end < context.now {
            return Err(ReconcileError::InvalidContext(
                "windowEnd must not be before now".into(),
            ));
        }
        let max_end = context.now + Duration::days(i64::from(self.config.max_window_days));
        if context.window_end > max_end {
            return Err(ReconcileError::InvalidContext(format!(
                "windowEnd must be {} days or less from now",
                self.config.max_window_days
            )));
        }
        Ok(())
    }
}
