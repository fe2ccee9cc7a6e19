//! Domain analysis orchestrator
//!
//! Runs the full metric battery for one domain, computes the derived
//! quantities, and classifies data-quality warnings. The battery is
//! read-only and the operations are independent; they are issued
//! sequentially here so console output interleaves deterministically.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain_metrics::DomainMetrics;
use crate::errors::Result;
use crate::gateway::QueryGateway;
use crate::group_metrics::{BuiltinAdminMembers, GroupMetrics};
use crate::user_metrics::UserMetrics;
use crate::warnings::DataQualityWarning;

/// The named group whose remote-access roster is reported per domain.
pub const REMOTE_ACCESS_GROUP: &str = "REMOTE DESKTOP USERS";

/// Everything computed for one successfully analyzed domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainAnalysis {
    pub domain: String,
    pub warnings: Vec<DataQualityWarning>,

    // Domain facts
    pub gpo_names: Vec<String>,
    pub blocked_inheritance_ous: Vec<String>,
    pub operating_systems: Vec<(String, i64)>,
    pub da_session_computers: Vec<String>,
    pub local_admin_counts: Vec<(String, i64)>,

    // Group membership statistics
    pub avg_membership_direct: Option<f64>,
    pub avg_membership_recursive: Option<f64>,
    /// `recursive - direct`; undefined when either operand is undefined.
    pub membership_delta: Option<f64>,
    pub builtin_admins: BuiltinAdminMembers,
    pub admin_like_groups: Vec<String>,
    pub local_admin_groups: Vec<String>,
    pub foreign_group_membership: BTreeMap<String, BTreeSet<String>>,
    pub remote_access_members: Vec<String>,

    // User and computer statistics
    pub total_users: i64,
    pub total_enabled_users: i64,
    pub total_computers: i64,
    pub da_paths: i64,
    pub avg_path_length: Option<f64>,
    pub pct_users_with_path_to_da: f64,
    pub pct_computers_with_path_to_da: f64,
    pub domain_admins_with_spn: Vec<String>,
    pub unconstrained_delegation_computers: Vec<String>,
    pub stale_credentials: BTreeMap<String, DateTime<Utc>>,
    pub suspicious_accounts: Vec<String>,
    pub user_foreign_membership: BTreeMap<String, BTreeSet<String>>,
}

impl DomainAnalysis {
    /// Accounts present but not enabled.
    pub fn disabled_users(&self) -> i64 {
        self.total_users - self.total_enabled_users
    }
}

/// A domain dropped from the batch because its group data is unusable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedDomain {
    pub domain: String,
    pub warning: DataQualityWarning,
}

/// Outcome of analyzing one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DomainReport {
    Analyzed(Box<DomainAnalysis>),
    Skipped(SkippedDomain),
}

pub struct DomainAnalyzer<'a, G> {
    domains: DomainMetrics<'a, G>,
    groups: GroupMetrics<'a, G>,
    users: UserMetrics<'a, G>,
    pass_age_months: u32,
}

impl<'a, G: QueryGateway> DomainAnalyzer<'a, G> {
    pub fn new(gateway: &'a G, pass_age_months: u32) -> Self {
        Self {
            domains: DomainMetrics::new(gateway),
            groups: GroupMetrics::new(gateway),
            users: UserMetrics::new(gateway),
            pass_age_months,
        }
    }

    /// Run the full battery for one domain.
    ///
    /// Returns the skipped variant when direct group-membership data is
    /// absent; the caller must not add a skipped domain's scalars to the
    /// batch totals.
    pub async fn analyze_domain(&self, domain: &str) -> Result<DomainReport> {
        self.analyze_domain_at(domain, Utc::now()).await
    }

    /// Same as [`analyze_domain`](Self::analyze_domain) with an explicit
    /// reference instant for the stale-credential cutoff.
    pub async fn analyze_domain_at(
        &self,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<DomainReport> {
        let domain = domain.to_uppercase();
        info!("Analyzing domain {}", domain);

        // Domain facts
        let gpo_names = self.domains.gpo_names(&domain).await?;
        let blocked_inheritance_ous = self.domains.blocked_inheritance_ous(&domain).await?;
        let operating_systems = self.domains.operating_system_counts(&domain).await?;
        let da_session_computers = self.domains.computers_with_da_session(&domain).await?;
        let local_admin_counts = self.domains.local_admin_counts(&domain).await?;

        // Group membership statistics
        let avg_membership_direct = self.groups.avg_group_membership(&domain, false).await?;
        let avg_membership_recursive = self.groups.avg_group_membership(&domain, true).await?;
        let builtin_admins = self.groups.builtin_admin_members(&domain).await?;
        let admin_like_groups = self.groups.admin_like_groups(&domain).await?;
        let local_admin_groups = self.groups.local_admin_groups(&domain).await?;
        let foreign_group_membership = self.groups.foreign_group_membership(&domain).await?;
        let remote_access_members = self
            .groups
            .members_of_group(&domain, REMOTE_ACCESS_GROUP)
            .await?;

        // User and computer statistics
        let total_users = self.users.count_users(&domain, false).await?;
        let total_enabled_users = self.users.count_users(&domain, true).await?;
        let total_computers = self.users.count_computers(&domain).await?;
        let da_paths = self.domains.count_da_paths(&domain).await?;
        let avg_path_length = self.domains.avg_path_length(&domain).await?;
        let domain_admins_with_spn = self.users.domain_admins_with_spn(&domain).await?;
        let unconstrained_delegation_computers = self
            .users
            .unconstrained_delegation_computers(&domain)
            .await?;
        let stale_credentials = self
            .users
            .stale_credentials(&domain, self.pass_age_months, now)
            .await?;
        let suspicious_accounts = self.users.suspicious_account_names(&domain).await?;
        let user_foreign_membership = self.users.foreign_group_membership(&domain).await?;

        // Derived quantities. Percentages are defined as exactly zero
        // when the divisor is zero.
        let membership_delta = match (avg_membership_recursive, avg_membership_direct) {
            (Some(recursive), Some(direct)) => Some(recursive - direct),
            _ => None,
        };
        let pct_users_with_path_to_da = percentage(da_paths, total_users);
        let pct_computers_with_path_to_da = percentage(da_paths, total_computers);

        // Warning classification, in fixed order. The first three are
        // independent; the last is fatal for the domain.
        let mut warnings = Vec::new();
        if gpo_names.is_empty() {
            warnings.push(DataQualityWarning::NoGpos);
        }
        if total_enabled_users == 0 {
            warnings.push(DataQualityWarning::NoEnabledAttribute);
        }
        if operating_systems.is_empty() {
            warnings.push(DataQualityWarning::NoOsAttribute);
        }
        if avg_membership_direct.is_none() {
            warn!(
                "Domain {} has no direct group-membership data; skipping",
                domain
            );
            return Ok(DomainReport::Skipped(SkippedDomain {
                domain,
                warning: DataQualityWarning::IncompleteGroupData,
            }));
        }

        Ok(DomainReport::Analyzed(Box::new(DomainAnalysis {
            domain,
            warnings,
            gpo_names,
            blocked_inheritance_ous,
            operating_systems,
            da_session_computers,
            local_admin_counts,
            avg_membership_direct,
            avg_membership_recursive,
            membership_delta,
            builtin_admins,
            admin_like_groups,
            local_admin_groups,
            foreign_group_membership,
            remote_access_members,
            total_users,
            total_enabled_users,
            total_computers,
            da_paths,
            avg_path_length,
            pct_users_with_path_to_da,
            pct_computers_with_path_to_da,
            domain_admins_with_spn,
            unconstrained_delegation_computers,
            stale_credentials,
            suspicious_accounts,
            user_foreign_membership,
        })))
    }
}

fn percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        100.0 * numerator as f64 / denominator as f64
    }
}
