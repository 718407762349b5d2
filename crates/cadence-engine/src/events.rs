//! The per-participant activity event store.
//!
//! Events are `(owner, key) -> timestamp`. Writes follow three rules:
//!
//! - `enrollment` and `activities_retrieved` are write-once.
//! - `question:{id}:answered={value}` keeps at most one value per question and
//!   applies only when newer than every stored value for that question.
//! - Everything else applies only when strictly newer than the stored value.
//!
//! A rejected write is not an error. [`EventStore::publish`] returns
//! `Ok(false)` and the store is unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::activity::ScheduledActivity;
use crate::config::SchedulerConfig;
use crate::error::{EventError, StoreError};
use crate::event_key::EventKey;
use crate::period::Period;

/// Event key (in its string grammar) to UTC timestamp.
pub type EventMap = BTreeMap<String, DateTime<Utc>>;

/// Raw persistence for activity events. No rules applied at this level.
pub trait EventRepository: Send + Sync {
    fn load_all(&self, owner_id: &str) -> Result<EventMap, StoreError>;

    /// Run `update` against the owner's events as one atomic step.
    ///
    /// Concurrent calls for the same owner must be serialized, so `update`
    /// always sees the result of every write before it. Returns what
    /// `update` returns.
    fn update(&self, owner_id: &str, update: &mut dyn FnMut(&mut EventMap) -> bool) -> Result<bool, StoreError>;

    fn remove_all(&self, owner_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    events: DashMap<String, EventMap>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventRepository for InMemoryEventRepository {
    fn load_all(&self, owner_id: &str) -> Result<EventMap, StoreError> {
        Ok(self
            .events
            .get(owner_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn update(&self, owner_id: &str, update: &mut dyn FnMut(&mut EventMap) -> bool) -> Result<bool, StoreError> {
        // The entry guard holds the shard lock until the closure returns.
        let mut entry = self.events.entry(owner_id.to_string()).or_default();
        Ok(update(entry.value_mut()))
    }

    fn remove_all(&self, owner_id: &str) -> Result<(), StoreError> {
        self.events.remove(owner_id);
        Ok(())
    }
}

/// A custom event published automatically at a fixed offset from a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomaticEvent {
    pub name: String,
    pub trigger: EventKey,
    pub period: Period,
}

impl AutomaticEvent {
    /// Parse `"{trigger}:{period}"` or a bare `"{period}"` (enrollment trigger).
    ///
    /// The trigger is `enrollment`, `activities_retrieved`, a custom event
    /// name, or a `custom:{name}` key.
    pub fn parse(name: &str, definition: &str) -> Result<Self, EventError> {
        let fail = |reason: String| EventError::InvalidAutomaticEvent {
            name: name.to_string(),
            reason,
        };
        EventKey::custom(name).map_err(|e| fail(e.to_string()))?;

        let (trigger, period) = match definition.rsplit_once(':') {
            Some((trigger, period)) => (trigger.trim(), period.trim()),
            None => (crate::event_key::ENROLLMENT, definition.trim()),
        };
        let period: Period = period.parse().map_err(|e: crate::error::PeriodError| fail(e.to_string()))?;

        let trigger = match trigger.parse::<EventKey>() {
            Ok(key @ (EventKey::Enrollment | EventKey::ActivitiesRetrieved | EventKey::Custom(_))) => key,
            Ok(other) => {
                return Err(fail(format!(
                    "'{}' cannot trigger automatic events",
                    other
                )))
            }
            Err(_) => EventKey::custom(trigger).map_err(|e| fail(e.to_string()))?,
        };

        Ok(AutomaticEvent {
            name: name.to_string(),
            trigger,
            period,
        })
    }
}

/// Rule-enforcing facade over an [`EventRepository`].
#[derive(Clone)]
pub struct EventStore {
    repository: Arc<dyn EventRepository>,
    custom_event_keys: BTreeSet<String>,
    automatic_events: Vec<AutomaticEvent>,
}

impl EventStore {
    /// # Errors
    /// Returns `EventError::InvalidAutomaticEvent` if the config's automatic
    /// custom events do not parse.
    pub fn new(repository: Arc<dyn EventRepository>, config: &SchedulerConfig) -> Result<Self, EventError> {
        Ok(EventStore {
            repository,
            custom_event_keys: config.custom_event_keys.clone(),
            automatic_events: config.automatic_events()?,
        })
    }

    /// An event store over a fresh in-memory repository.
    pub fn in_memory(config: &SchedulerConfig) -> Result<Self, EventError> {
        EventStore::new(Arc::new(InMemoryEventRepository::new()), config)
    }

    /// Record an event. Returns whether the write was applied.
    ///
    /// An applied `enrollment`, `activities_retrieved` or `custom:*` write also
    /// publishes every automatic custom event it triggers. The rule check and
    /// every resulting write happen in one [`EventRepository::update`] call.
    pub fn publish(&self, owner_id: &str, key: &EventKey, timestamp: DateTime<Utc>) -> Result<bool, EventError> {
        let triggered: Vec<(EventKey, DateTime<Utc>)> = self
            .automatic_events
            .iter()
            .filter(|a| &a.trigger == key)
            .filter_map(|automatic| match automatic.period.add_to(timestamp.naive_utc()) {
                Some(local) => Some((EventKey::Custom(automatic.name.clone()), local.and_utc())),
                None => {
                    debug!(owner_id, event = %automatic.name, "automatic event overflows the calendar");
                    None
                }
            })
            .collect();

        let applied = self.repository.update(owner_id, &mut |events: &mut EventMap| {
            if !apply_rules(owner_id, events, key, timestamp) {
                return false;
            }
            for (custom, fires_at) in &triggered {
                apply_rules(owner_id, events, custom, *fires_at);
            }
            true
        })?;
        Ok(applied)
    }

    pub fn get(&self, owner_id: &str, key: &EventKey) -> Result<Option<DateTime<Utc>>, EventError> {
        Ok(self.repository.load_all(owner_id)?.remove(&key.to_string()))
    }

    pub fn get_all(&self, owner_id: &str) -> Result<EventMap, EventError> {
        Ok(self.repository.load_all(owner_id)?)
    }

    pub fn delete_all(&self, owner_id: &str) -> Result<(), EventError> {
        self.repository.remove_all(owner_id)?;
        debug!(owner_id, "deleted all activity events");
        Ok(())
    }

    pub fn publish_enrollment(&self, owner_id: &str, timestamp: DateTime<Utc>) -> Result<bool, EventError> {
        self.publish(owner_id, &EventKey::Enrollment, timestamp)
    }

    pub fn publish_activities_retrieved(&self, owner_id: &str, timestamp: DateTime<Utc>) -> Result<bool, EventError> {
        self.publish(owner_id, &EventKey::ActivitiesRetrieved, timestamp)
    }

    /// # Errors
    /// Returns `EventError::UnknownCustomEvent` for names the study does not declare.
    pub fn publish_custom(&self, owner_id: &str, name: &str, timestamp: DateTime<Utc>) -> Result<bool, EventError> {
        if !self.custom_event_keys.contains(name) {
            return Err(EventError::UnknownCustomEvent(name.to_string()));
        }
        self.publish(owner_id, &EventKey::custom(name)?, timestamp)
    }

    pub fn publish_question_answered<S: AsRef<str>>(
        &self,
        owner_id: &str,
        question_id: &str,
        answers: &[S],
        timestamp: DateTime<Utc>,
    ) -> Result<bool, EventError> {
        self.publish(owner_id, &EventKey::answered(question_id, answers)?, timestamp)
    }

    /// Publish `activity:{activityGuid}:finished` at the occurrence's `finishedOn`.
    ///
    /// Occurrences without `finishedOn`, and legacy identities without a
    /// `:`, publish nothing.
    pub fn publish_activity_finished(&self, activity: &ScheduledActivity) -> Result<bool, EventError> {
        let Some(finished_on) = activity.finished_on else {
            return Ok(false);
        };
        if !activity.guid.contains(':') {
            return Ok(false);
        }
        let key = EventKey::activity_finished(&activity.activity.guid)?;
        self.publish(&activity.owner_id, &key, finished_on)
    }
}

/// Apply one write to an owner's events under the store rules.
///
/// Returns whether the write was applied. A rejected write leaves `events`
/// unchanged.
fn apply_rules(owner_id: &str, events: &mut EventMap, key: &EventKey, timestamp: DateTime<Utc>) -> bool {
    let key_str = key.to_string();

    if key.is_immutable() {
        if events.contains_key(&key_str) {
            debug!(owner_id, key = %key_str, "ignored write to write-once event");
            return false;
        }
    } else if let Some(prefix) = key.answered_prefix() {
        if events
            .iter()
            .any(|(k, ts)| k.starts_with(&prefix) && timestamp <= *ts)
        {
            debug!(owner_id, key = %key_str, %timestamp, "ignored stale answer");
            return false;
        }
        events.retain(|k, _| !k.starts_with(&prefix));
    } else if let Some(existing) = events.get(&key_str) {
        if timestamp <= *existing {
            debug!(owner_id, key = %key_str, %timestamp, "ignored stale event");
            return false;
        }
    }

    events.insert(key_str, timestamp);
    true
}
