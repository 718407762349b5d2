//! Typed activity-event keys.
//!
//! Grammar:
//!
//! ```text
//! enrollment
//! activities_retrieved
//! custom:{key}
//! question:{questionId}:answered={value}
//! {category}:{objectId}:{verb}
//! ```
//!
//! Segments may not be empty or contain `:`. The answered value is free text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EventKeyError;

pub const ENROLLMENT: &str = "enrollment";
pub const ACTIVITIES_RETRIEVED: &str = "activities_retrieved";

const CUSTOM: &str = "custom";
const QUESTION: &str = "question";
const ANSWERED: &str = "answered";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKey {
    Enrollment,
    ActivitiesRetrieved,
    Custom(String),
    Answered { question_id: String, value: String },
    Object {
        category: String,
        object_id: String,
        verb: String,
    },
}

impl EventKey {
    pub fn custom(name: impl Into<String>) -> Result<Self, EventKeyError> {
        let name = name.into();
        check_segment(&name, &name)?;
        Ok(EventKey::Custom(name))
    }

    /// `question:{questionId}:answered={answers joined by ","}`.
    pub fn answered<S: AsRef<str>>(question_id: impl Into<String>, answers: &[S]) -> Result<Self, EventKeyError> {
        let question_id = question_id.into();
        check_segment(&question_id, &question_id)?;
        let value = answers.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
        Ok(EventKey::Answered { question_id, value })
    }

    pub fn object(
        category: impl Into<String>,
        object_id: impl Into<String>,
        verb: impl Into<String>,
    ) -> Result<Self, EventKeyError> {
        let (category, object_id, verb) = (category.into(), object_id.into(), verb.into());
        let key = format!("{}:{}:{}", category, object_id, verb);
        for segment in [&category, &object_id, &verb] {
            check_segment(&key, segment)?;
        }
        Ok(EventKey::Object {
            category,
            object_id,
            verb,
        })
    }

    /// `activity:{activityGuid}:finished`.
    pub fn activity_finished(activity_guid: &str) -> Result<Self, EventKeyError> {
        EventKey::object("activity", activity_guid, "finished")
    }

    /// Write-once keys. Every other key is monotonic.
    pub fn is_immutable(&self) -> bool {
        matches!(self, EventKey::Enrollment | EventKey::ActivitiesRetrieved)
    }

    /// Prefix shared by every value-variant of an answered key.
    pub fn answered_prefix(&self) -> Option<String> {
        match self {
            EventKey::Answered { question_id, .. } => {
                Some(format!("{}:{}:{}=", QUESTION, question_id, ANSWERED))
            }
            _ => None,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Enrollment => f.write_str(ENROLLMENT),
            EventKey::ActivitiesRetrieved => f.write_str(ACTIVITIES_RETRIEVED),
            EventKey::Custom(name) => write!(f, "{}:{}", CUSTOM, name),
            EventKey::Answered { question_id, value } => {
                write!(f, "{}:{}:{}={}", QUESTION, question_id, ANSWERED, value)
            }
            EventKey::Object {
                category,
                object_id,
                verb,
            } => write!(f, "{}:{}:{}", category, object_id, verb),
        }
    }
}

impl FromStr for EventKey {
    type Err = EventKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EventKeyError::Empty);
        }
        match s {
            ENROLLMENT => return Ok(EventKey::Enrollment),
            ACTIVITIES_RETRIEVED => return Ok(EventKey::ActivitiesRetrieved),
            _ => {}
        }

        let Some((head, rest)) = s.split_once(':') else {
            return Err(invalid(s, "expected 'enrollment', 'activities_retrieved' or a ':'-separated key"));
        };

        if head == CUSTOM {
            check_segment(s, rest)?;
            return Ok(EventKey::Custom(rest.to_string()));
        }

        if head == QUESTION {
            if let Some((question_id, tail)) = rest.split_once(':') {
                if let Some(value) = tail.strip_prefix(ANSWERED).and_then(|t| t.strip_prefix('=')) {
                    check_segment(s, question_id)?;
                    return Ok(EventKey::Answered {
                        question_id: question_id.to_string(),
                        value: value.to_string(),
                    });
                }
                if tail == ANSWERED {
                    return Err(invalid(s, "answered events require '=' and a value"));
                }
            }
        }

        let mut parts = rest.splitn(2, ':');
        let object_id = parts.next().unwrap_or_default();
        let Some(verb) = parts.next() else {
            return Err(invalid(s, "expected {category}:{objectId}:{verb}"));
        };
        for segment in [head, object_id, verb] {
            check_segment(s, segment)?;
        }
        Ok(EventKey::Object {
            category: head.to_string(),
            object_id: object_id.to_string(),
            verb: verb.to_string(),
        })
    }
}

impl Serialize for EventKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn check_segment(key: &str, segment: &str) -> Result<(), EventKeyError> {
    if segment.is_empty() {
        return Err(invalid(key, "segments cannot be empty"));
    }
    if segment.contains(':') {
        return Err(invalid(key, "segments cannot contain ':'"));
    }
    Ok(())
}

fn invalid(key: &str, reason: &str) -> EventKeyError {
    EventKeyError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
