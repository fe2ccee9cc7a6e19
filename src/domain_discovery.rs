//! Domain discovery and preparation
//!
//! Determines the working set of domains for a run. A user-specified
//! domain is validated against the domains that actually have data;
//! otherwise every data-bearing domain is analyzed and the full domain
//! inventory is cross-checked to report domains the dataset knows about
//! but has no data for.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain_metrics::DomainMetrics;
use crate::errors::{AuditError, Result};
use crate::gateway::QueryGateway;

/// A domain present in the dataset's topology but absent from every
/// data-bearing query. Informational; it does not block the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDataRecommendation {
    pub domain: String,
}

impl fmt::Display for MissingDataRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: found in the dataset but no data has been collected for it; \
             run a collection against this domain",
            self.domain
        )
    }
}

/// Compute the ordered set of domains to analyze in this run.
///
/// With a requested domain, the set is exactly that domain, validated
/// against the data-bearing inventory; an unknown domain fails the run
/// before any analysis. Without one, the set is every data-bearing
/// domain in lexical order, plus one recommendation per known domain
/// with no usable data.
pub async fn prepare_domain_set<G: QueryGateway>(
    metrics: &DomainMetrics<'_, G>,
    requested: Option<&str>,
) -> Result<(Vec<String>, Vec<MissingDataRecommendation>)> {
    let with_data = metrics.list_domains(false).await?;

    if let Some(requested) = requested {
        let requested = requested.to_uppercase();
        if !with_data.contains(&requested) {
            return Err(AuditError::UnknownDomain { domain: requested });
        }
        info!("Analyzing requested domain {}", requested);
        return Ok((vec![requested], Vec::new()));
    }

    let inventory = metrics.list_domains(true).await?;
    let missing: Vec<MissingDataRecommendation> = inventory
        .into_iter()
        .filter(|domain| !with_data.contains(domain))
        .map(|domain| MissingDataRecommendation { domain })
        .collect();

    info!(
        "Analyzing {} domains with data ({} known domains without data)",
        with_data.len(),
        missing.len()
    );
    for recommendation in &missing {
        warn!("{}", recommendation);
    }

    Ok((with_data, missing))
}
