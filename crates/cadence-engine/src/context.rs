//! The per-request scheduling context supplied by the calling layer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::criteria::{ClientInfo, CriteriaContext};

/// Everything one scheduling request knows about the participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleContext {
    pub owner_id: String,
    /// Zone used to interpret every stored local date-time in this request.
    pub zone: Tz,
    pub now: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub criteria: CriteriaContext,
    /// Fallback anchor when no `enrollment` event has been recorded.
    pub account_created_on: Option<DateTime<Utc>>,
    /// Keep expanding recurring schedules past `window_end` until at least
    /// this many occurrence times exist. Zero disables the minimum.
    pub minimum_per_schedule: u32,
}

impl ScheduleContext {
    pub fn builder(owner_id: impl Into<String>) -> ScheduleContextBuilder {
        let now = Utc::now();
        ScheduleContextBuilder {
            context: ScheduleContext {
                owner_id: owner_id.into(),
                zone: Tz::UTC,
                now,
                window_end: now,
                criteria: CriteriaContext::default(),
                account_created_on: None,
                minimum_per_schedule: 0,
            },
        }
    }
}

pub struct ScheduleContextBuilder {
    context: ScheduleContext,
}

impl ScheduleContextBuilder {
    pub fn zone(mut self, zone: Tz) -> Self {
        self.context.zone = zone;
        self
    }

    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.context.now = now;
        self
    }

    pub fn window_end(mut self, window_end: DateTime<Utc>) -> Self {
        self.context.window_end = window_end;
        self
    }

    pub fn client(mut self, client: ClientInfo) -> Self {
        self.context.criteria.client = client;
        self
    }

    pub fn data_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.criteria.data_groups = groups.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        self
    }

    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.criteria.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn account_created_on(mut self, created_on: DateTime<Utc>) -> Self {
        self.context.account_created_on = Some(created_on);
        self
    }

    pub fn minimum_per_schedule(mut self, minimum: u32) -> Self {
        self.context.minimum_per_schedule = minimum;
        self
    }

    pub fn build(self) -> ScheduleContext {
        self.context
    }
}
