//! Error types for cadence-engine operations.
//!
//! Each concern gets its own enum so callers can match on the failures they
//! actually handle. Rejected event writes are not errors (see [`crate::events`]).

use thiserror::Error;

/// A malformed ISO-8601 period string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Empty period string")]
    Empty,

    #[error("Invalid period '{input}': {reason}")]
    Invalid { input: String, reason: String },
}

/// A malformed activity event key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventKeyError {
    #[error("Empty event key")]
    Empty,

    #[error("Invalid event key '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// A criteria definition that can never match anything sensible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("maxAppVersions.{os} ({max}) cannot be less than minAppVersions.{os} ({min})")]
    VersionRange { os: String, min: u32, max: u32 },

    #[error("allOfGroups includes these excluded data groups: {0}")]
    OverlappingGroups(String),

    #[error("'{group}' is not in enumeration: {declared}")]
    UndeclaredGroup { group: String, declared: String },
}

/// A schedule, activity or plan rejected at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid schedule: {0}")]
    Invalid(String),

    #[error("Invalid period: {0}")]
    Period(#[from] PeriodError),

    #[error("Invalid criteria: {0}")]
    Criteria(#[from] CriteriaError),
}

/// Failure of a backing store. The only error class that is a hard failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the event store.
#[derive(Error, Debug)]
pub enum EventError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Study does not declare custom event key: {0}")]
    UnknownCustomEvent(String),

    #[error(transparent)]
    InvalidKey(#[from] EventKeyError),

    #[error("Invalid automatic custom event '{name}': {reason}")]
    InvalidAutomaticEvent { name: String, reason: String },
}

/// Errors raised by the reconciler entry points.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Scheduled activity not found: {0}")]
    NotFound(String),

    #[error("Invalid schedule context: {0}")]
    InvalidContext(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),
}

/// Errors raised while loading a [`crate::config::SchedulerConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
