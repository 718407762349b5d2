//! # cadence-engine
//!
//! Deterministic participant activity scheduling.
//!
//! Schedule plans describe when participants should do things relative to
//! events in their history (enrollment, finishing a survey, answering a
//! question). The engine picks the schedule that fits each participant,
//! expands it into dated occurrences, and reconciles those with what has
//! already been persisted so repeated reads converge on the same records.
//!
//! ## Modules
//!
//! - [`criteria`] — Specificity-scored rule matching, generic over the payload
//! - [`schedule`] — Schedules, activities, strategies and plans
//! - [`period`] — ISO-8601 periods with calendar arithmetic
//! - [`expander`] — Schedule + events → sorted occurrence candidates
//! - [`activity`] — Occurrences, their identity, and derived status
//! - [`event_key`] — The activity-event key grammar
//! - [`events`] — Write-once and monotonic event store
//! - [`store`] — Persistence seams for occurrences and plans
//! - [`reconciler`] — Read-materialize-merge and progress updates
//! - [`context`] — Per-request scheduling context
//! - [`dst`] — DST transition policies
//! - [`config`] — TOML-backed scheduler configuration
//! - [`error`] — Error types

pub mod activity;
pub mod config;
pub mod context;
pub mod criteria;
pub mod dst;
pub mod error;
pub mod event_key;
pub mod events;
pub mod expander;
pub mod period;
pub mod reconciler;
pub mod schedule;
pub mod store;

mod serde_ext;

pub use activity::{ActivityStatus, ProgressUpdate, ScheduledActivity, ScheduledActivityView};
pub use config::SchedulerConfig;
pub use context::ScheduleContext;
pub use criteria::{select_best, ClientInfo, Criteria, CriteriaContext};
pub use dst::DstPolicy;
pub use error::{
    ConfigError, CriteriaError, EventError, EventKeyError, PeriodError, ReconcileError, ScheduleError, StoreError,
};
pub use event_key::EventKey;
pub use events::{EventMap, EventRepository, EventStore, InMemoryEventRepository};
pub use expander::{expand, expand_plan, Window};
pub use period::Period;
pub use reconciler::Reconciler;
pub use schedule::{
    Activity, ActivityReference, Schedule, ScheduleBuilder, ScheduleCriteria, SchedulePlan, ScheduleStrategy,
    ScheduleType,
};
pub use store::{ActivityStore, InMemoryActivityStore, InMemoryPlanSource, PlanSource};
