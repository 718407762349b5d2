//! Rule-based selection: score criteria against a participant and pick the
//! most specific match.
//!
//! Nothing here knows about schedules. [`select_best`] is generic over the
//! payload so the same matcher picks schedules, cohorts or app configs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CriteriaError;
use crate::serde_ext::null_as_default;

/// The client application making a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub os_name: Option<String>,
    pub app_version: Option<u32>,
}

impl ClientInfo {
    pub fn new(os_name: impl Into<String>, app_version: u32) -> Self {
        ClientInfo {
            os_name: Some(os_name.into()),
            app_version: Some(app_version),
        }
    }

    /// A client that reported neither OS nor version.
    pub fn unknown() -> Self {
        ClientInfo::default()
    }

    /// The (OS, version) pair, present only when both are known.
    pub fn os_and_version(&self) -> Option<(&str, u32)> {
        match (&self.os_name, self.app_version) {
            (Some(os), Some(version)) => Some((os.as_str(), version)),
            _ => None,
        }
    }
}

/// The participant attributes criteria are matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaContext {
    #[serde(default)]
    pub client: ClientInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_groups: BTreeSet<String>,
    /// Preferred languages, most preferred first.
    #[serde(default, deserialize_with = "null_as_default")]
    pub languages: Vec<String>,
}

/// Per-OS application version bounds.
pub type AppVersions = BTreeMap<String, u32>;

/// A matching rule. Every unset dimension is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criteria {
    #[serde(default, deserialize_with = "null_as_default")]
    pub min_app_versions: AppVersions,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_app_versions: AppVersions,
    #[serde(default, deserialize_with = "null_as_default")]
    pub all_of_groups: BTreeSet<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub none_of_groups: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Criteria {
    /// The catch-all criteria: matches every context with specificity 0.
    pub fn any() -> Self {
        Criteria::default()
    }

    pub fn with_min_app_version(mut self, os: impl Into<String>, version: u32) -> Self {
        self.min_app_versions.insert(os.into(), version);
        self
    }

    pub fn with_max_app_version(mut self, os: impl Into<String>, version: u32) -> Self {
        self.max_app_versions.insert(os.into(), version);
        self
    }

    pub fn with_all_of_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all_of_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_none_of_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.none_of_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Score this criteria against a context.
    ///
    /// Returns `None` when any set constraint fails, otherwise the number of
    /// set constraints that were satisfied. Version bounds only count when
    /// the client reported both its OS and version.
    pub fn specificity(&self, context: &CriteriaContext) -> Option<u32> {
        let mut score = 0;

        if let Some((os, version)) = context.client.os_and_version() {
            if let Some(&min) = self.min_app_versions.get(os) {
                if version < min {
                    return None;
                }
                score += 1;
            }
            if let Some(&max) = self.max_app_versions.get(os) {
                if version > max {
                    return None;
                }
                score += 1;
            }
        }

        if !self.all_of_groups.is_empty() {
            if !self.all_of_groups.is_subset(&context.data_groups) {
                return None;
            }
            score += 1;
        }

        if !self.none_of_groups.is_empty() {
            if !self.none_of_groups.is_disjoint(&context.data_groups) {
                return None;
            }
            score += 1;
        }

        if let Some(language) = &self.language {
            let declared = context
                .languages
                .iter()
                .any(|preferred| preferred.eq_ignore_ascii_case(language));
            if !declared {
                return None;
            }
            score += 1;
        }

        Some(score)
    }

    pub fn matches(&self, context: &CriteriaContext) -> bool {
        self.specificity(context).is_some()
    }

    /// Reject criteria that can never match, or that name undeclared groups.
    ///
    /// When `declared_groups` is `None` group membership is not checked.
    pub fn validate(&self, declared_groups: Option<&BTreeSet<String>>) -> Result<(), CriteriaError> {
        for (os, &max) in &self.max_app_versions {
            if let Some(&min) = self.min_app_versions.get(os) {
                if max < min {
                    return Err(CriteriaError::VersionRange {
                        os: os.clone(),
                        min,
                        max,
                    });
                }
            }
        }

        let overlap: Vec<&str> = self
            .all_of_groups
            .intersection(&self.none_of_groups)
            .map(String::as_str)
            .collect();
        if !overlap.is_empty() {
            return Err(CriteriaError::OverlappingGroups(overlap.join(", ")));
        }

        if let Some(declared) = declared_groups {
            for group in self.all_of_groups.iter().chain(&self.none_of_groups) {
                if !declared.contains(group) {
                    let listed = if declared.is_empty() {
                        "<empty>".to_string()
                    } else {
                        declared.iter().cloned().collect::<Vec<_>>().join(", ")
                    };
                    return Err(CriteriaError::UndeclaredGroup {
                        group: group.clone(),
                        declared: listed,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Pick the payload whose criteria match `context` most specifically.
///
/// Candidates that fail any set constraint are excluded. Among the rest the
/// highest specificity wins; ties go to the candidate declared first.
pub fn select_best<'a, T, I>(candidates: I, context: &CriteriaContext) -> Option<T>
where
    I: IntoIterator<Item = (&'a Criteria, T)>,
{
    let mut best: Option<(u32, T)> = None;
    for (criteria, payload) in candidates {
        let Some(score) = criteria.specificity(context) else {
            continue;
        };
        // Strictly greater keeps the earlier candidate on ties.
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, payload));
        }
    }
    best.map(|(_, payload)| payload)
}
