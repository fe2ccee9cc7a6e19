//! Data-quality warnings
//!
//! Warnings are derived from a domain's own metric results, not from the
//! transport. Each tag carries a human message plus the collection method
//! that was most likely missing when the dataset was gathered.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A per-domain data-quality condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataQualityWarning {
    /// The domain has no GPO nodes at all.
    NoGpos,
    /// The enabled-user count is zero, which in practice means the
    /// Enabled attribute was never collected.
    NoEnabledAttribute,
    /// No computer reported an operating system attribute.
    NoOsAttribute,
    /// Direct group-membership data is absent. Fatal for the domain:
    /// no further report content is produced and the domain contributes
    /// nothing to the cross-domain totals.
    IncompleteGroupData,
}

impl DataQualityWarning {
    pub fn message(&self) -> &'static str {
        match self {
            DataQualityWarning::NoGpos => "No GPOs found for this domain",
            DataQualityWarning::NoEnabledAttribute => {
                "No enabled users found; the Enabled attribute appears to be missing"
            }
            DataQualityWarning::NoOsAttribute => {
                "No operating system attributes found on this domain's computers"
            }
            DataQualityWarning::IncompleteGroupData => {
                "Group membership data is missing for this domain; skipping it"
            }
        }
    }

    /// The collection method whose absence best explains the condition.
    pub fn collection_method(&self) -> &'static str {
        match self {
            DataQualityWarning::NoGpos => "Container",
            DataQualityWarning::NoEnabledAttribute => "ObjectProps",
            DataQualityWarning::NoOsAttribute => "ObjectProps",
            DataQualityWarning::IncompleteGroupData => "Group",
        }
    }

    /// Whether this warning short-circuits the rest of the domain's report.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DataQualityWarning::IncompleteGroupData)
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Missing CollectionMethod: {})",
            self.message(),
            self.collection_method()
        )
    }
}
