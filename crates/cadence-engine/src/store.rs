//! Persistence seams for materialized occurrences and schedule plans.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use dashmap::DashMap;

use crate::activity::ScheduledActivity;
use crate::error::StoreError;
use crate::schedule::SchedulePlan;

/// Storage for materialized occurrences, keyed by `(owner_id, guid)`.
///
/// Implementations persist the local wall-clock fields only. The request
/// zone in [`ScheduledActivity::time_zone`] is never stored.
pub trait ActivityStore: Send + Sync {
    fn load(&self, owner_id: &str, guid: &str) -> Result<Option<ScheduledActivity>, StoreError>;

    /// Records that exist among `guids`. Missing identities are simply absent.
    fn batch_load(&self, owner_id: &str, guids: &[String]) -> Result<HashMap<String, ScheduledActivity>, StoreError>;

    fn batch_save(&self, activities: &[ScheduledActivity]) -> Result<(), StoreError>;

    fn batch_delete(&self, activities: &[ScheduledActivity]) -> Result<(), StoreError>;

    /// Records whose `local_scheduled_on` falls in `[from, to]`.
    fn query(&self, owner_id: &str, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<ScheduledActivity>, StoreError>;

    /// Every record for the owner.
    fn load_all(&self, owner_id: &str) -> Result<Vec<ScheduledActivity>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryActivityStore {
    activities: DashMap<String, BTreeMap<String, ScheduledActivity>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored for the owner.
    pub fn count(&self, owner_id: &str) -> usize {
        self.activities.get(owner_id).map_or(0, |entry| entry.len())
    }
}

impl ActivityStore for InMemoryActivityStore {
    fn load(&self, owner_id: &str, guid: &str) -> Result<Option<ScheduledActivity>, StoreError> {
        Ok(self
            .activities
            .get(owner_id)
            .and_then(|entry| entry.get(guid).cloned()))
    }

    fn batch_load(&self, owner_id: &str, guids: &[String]) -> Result<HashMap<String, ScheduledActivity>, StoreError> {
        let Some(entry) = self.activities.get(owner_id) else {
            return Ok(HashMap::new());
        };
        Ok(guids
            .iter()
            .filter_map(|guid| entry.get(guid).map(|a| (guid.clone(), a.clone())))
            .collect())
    }

    fn batch_save(&self, activities: &[ScheduledActivity]) -> Result<(), StoreError> {
        for activity in activities {
            let mut record = activity.clone();
            record.time_zone = None;
            self.activities
                .entry(record.owner_id.clone())
                .or_default()
                .insert(record.guid.clone(), record);
        }
        Ok(())
    }

    fn batch_delete(&self, activities: &[ScheduledActivity]) -> Result<(), StoreError> {
        for activity in activities {
            if let Some(mut entry) = self.activities.get_mut(&activity.owner_id) {
                entry.remove(&activity.guid);
            }
        }
        self.activities.retain(|_, records| !records.is_empty());
        Ok(())
    }

    fn query(&self, owner_id: &str, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<ScheduledActivity>, StoreError> {
        Ok(self
            .activities
            .get(owner_id)
            .map(|entry| {
                entry
                    .values()
                    .filter(|a| a.local_scheduled_on.is_some_and(|on| on >= from && on <= to))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn load_all(&self, owner_id: &str) -> Result<Vec<ScheduledActivity>, StoreError> {
        Ok(self
            .activities
            .get(owner_id)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Where the reconciler finds the schedule plans a participant is subject to.
pub trait PlanSource: Send + Sync {
    fn schedule_plans(&self) -> Result<Vec<SchedulePlan>, StoreError>;
}

impl PlanSource for Vec<SchedulePlan> {
    fn schedule_plans(&self) -> Result<Vec<SchedulePlan>, StoreError> {
        Ok(self.clone())
    }
}

/// Mutable plan registry. Plans are returned sorted by guid.
#[derive(Debug, Default)]
pub struct InMemoryPlanSource {
    plans: DashMap<String, SchedulePlan>,
}

impl InMemoryPlanSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a plan. Returns the plan it replaced.
    pub fn upsert(&self, plan: SchedulePlan) -> Option<SchedulePlan> {
        self.plans.insert(plan.guid().to_string(), plan)
    }

    pub fn remove(&self, guid: &str) -> Option<SchedulePlan> {
        self.plans.remove(guid).map(|(_, plan)| plan)
    }
}

impl PlanSource for InMemoryPlanSource {
    fn schedule_plans(&self) -> Result<Vec<SchedulePlan>, StoreError> {
        let mut plans: Vec<SchedulePlan> = self.plans.iter().map(|entry| entry.value().clone()).collect();
        plans.sort_by(|a, b| a.guid().cmp(b.guid()));
        Ok(plans)
    }
}
