//! Scheduler configuration, loaded from TOML.
//!
//! ```toml
//! max_window_days = 14
//! default_event_key = "enrollment"
//! dst_policy = "shift_forward"
//! custom_event_keys = ["studyBurstStart"]
//!
//! [automatic_custom_events]
//! threeDaysAfter = "enrollment:P3D"
//! burstReminder = "studyBurstStart:P1W"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::error::ConfigError;
use crate::event_key::EventKey;
use crate::events::AutomaticEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Furthest a request window may reach past `now`, in days.
    pub max_window_days: u32,
    /// Anchor key for schedules that do not name an `eventId`.
    pub default_event_key: String,
    /// Upper bound on occurrence times generated per schedule and request.
    pub max_occurrences_per_schedule: usize,
    pub dst_policy: DstPolicy,
    /// Publish `activities_retrieved` on each read (write-once, so only the first sticks).
    pub publish_activities_retrieved: bool,
    /// Custom event names the study declares. Publishing any other is rejected.
    pub custom_event_keys: BTreeSet<String>,
    /// Event name to `"{trigger}:{period}"`. A bare period triggers on enrollment.
    pub automatic_custom_events: BTreeMap<String, String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_window_days: 14,
            default_event_key: crate::event_key::ENROLLMENT.to_string(),
            max_occurrences_per_schedule: 500,
            dst_policy: DstPolicy::default(),
            publish_activities_retrieved: true,
            custom_event_keys: BTreeSet::new(),
            automatic_custom_events: BTreeMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate config from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_window_days == 0 {
            return Err(ConfigError::Invalid("max_window_days must be at least 1".into()));
        }
        if self.max_occurrences_per_schedule == 0 {
            return Err(ConfigError::Invalid(
                "max_occurrences_per_schedule must be at least 1".into(),
            ));
        }
        self.default_event_key
            .parse::<EventKey>()
            .map_err(|e| ConfigError::Invalid(format!("default_event_key: {}", e)))?;
        for name in &self.custom_event_keys {
            EventKey::custom(name.as_str())
                .map_err(|e| ConfigError::Invalid(format!("custom_event_keys: {}", e)))?;
        }
        self.automatic_events()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Parsed automatic custom events, sorted by name.
    pub fn automatic_events(&self) -> Result<Vec<AutomaticEvent>, crate::error::EventError> {
        self.automatic_custom_events
            .iter()
            .map(|(name, definition)| AutomaticEvent::parse(name, definition))
            .collect()
    }
}
