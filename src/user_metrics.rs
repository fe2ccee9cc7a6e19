//! User metrics provider
//!
//! User and computer account statistics: totals, Kerberoasting and
//! delegation exposure signals, stale credentials, suspicious account
//! naming, and cross-domain membership of user accounts.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain_metrics::{first_int, non_empty_strings};
use crate::errors::Result;
use crate::gateway::{CypherValue, QueryGateway};
use crate::group_metrics::foreign_membership_map;

/// Name heuristics that often denote accounts with administrator
/// privileges. Matching is case-insensitive throughout.
pub const SUSPICIOUS_NAME_CLAUSES: [&str; 14] = [
    "u.name STARTS WITH '_'",
    "u.name STARTS WITH '$'",
    "u.name =~ '(?i).*ADMIN_.*'",
    "u.name =~ '(?i).*ADMIN-.*'",
    "u.name =~ '(?i).*_ADMIN.*'",
    "u.name =~ '(?i).*-ADMIN.*'",
    "u.name =~ '(?i).*ADM_.*'",
    "u.name =~ '(?i).*ADM-.*'",
    "u.name =~ '(?i).*_ADM.*'",
    "u.name =~ '(?i).*-ADM.*'",
    "u.name =~ '(?i).*_A.*'",
    "u.name =~ '(?i).*-A.*'",
    "u.name =~ '(?i).*A_.*'",
    "u.name =~ '(?i).*A-.*'",
];

pub struct UserMetrics<'a, G> {
    gateway: &'a G,
}

impl<'a, G: QueryGateway> UserMetrics<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Total user accounts in the domain; with `enabled_only`, only
    /// accounts carrying the Enabled attribute set to true.
    pub async fn count_users(&self, domain: &str, enabled_only: bool) -> Result<i64> {
        let domain = domain.to_uppercase();
        let (cypher, column) = if enabled_only {
            (
                format!(
                    "MATCH (u:User {{domain:'{domain}'}})\n\
                     WHERE u.Enabled = True\n\
                     RETURN COUNT(DISTINCT(u)) AS enabledUserCount"
                ),
                "enabledUserCount",
            )
        } else {
            (
                format!(
                    "MATCH (u:User {{domain:'{domain}'}})\n\
                     RETURN COUNT(DISTINCT(u)) AS userCount"
                ),
                "userCount",
            )
        };

        let rows = self.gateway.run(&cypher, &[column]).await?;
        Ok(first_int(&rows))
    }

    /// Total computer accounts in the domain.
    pub async fn count_computers(&self, domain: &str) -> Result<i64> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (c:Computer {{domain:'{domain}'}})\n\
             RETURN COUNT(DISTINCT(c)) AS computerCount"
        );

        let rows = self.gateway.run(&cypher, &["computerCount"]).await?;
        Ok(first_int(&rows))
    }

    /// Domain Admins whose account also carries a Service Principal
    /// Name, a Kerberoasting exposure signal.
    pub async fn domain_admins_with_spn(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (u:User {{domain:'{domain}'}})-[:MemberOf*1..]->\
             (g:Group {{name:'DOMAIN ADMINS@{domain}'}})\n\
             WHERE u.HasSPN = True\n\
             RETURN u.name AS userName"
        );

        let rows = self.gateway.run(&cypher, &["userName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// Computers with unconstrained delegation enabled.
    pub async fn unconstrained_delegation_computers(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (c:Computer {{domain:'{domain}'}})\n\
             WHERE c.UnconstrainedDelegation = True\n\
             RETURN c.name AS computerName"
        );

        let rows = self.gateway.run(&cypher, &["computerName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// Users whose last password change is older than `age_months`
    /// before `now`, mapped to the change timestamp.
    ///
    /// An account with no password-change attribute is excluded
    /// entirely; absence is never treated as "old".
    pub async fn stale_credentials(
        &self,
        domain: &str,
        age_months: u32,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, DateTime<Utc>>> {
        let domain = domain.to_uppercase();
        let cutoff = now - Duration::days(i64::from(age_months) * 365 / 12);
        let cypher = format!(
            "MATCH (u:User {{domain:'{domain}'}})\n\
             RETURN u.name AS userName, u.PwdLastSet AS pwdLastSet"
        );

        let rows = self
            .gateway
            .run(&cypher, &["userName", "pwdLastSet"])
            .await?;

        let mut stale = BTreeMap::new();
        for row in rows {
            let name = match row.first().and_then(CypherValue::as_str) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => continue,
            };
            let changed_at = match row.get(1).and_then(epoch_timestamp) {
                Some(ts) => ts,
                None => continue,
            };
            if changed_at < cutoff {
                stale.insert(name, changed_at);
            }
        }
        debug!(
            "{} accounts with passwords older than {} months",
            stale.len(),
            age_months
        );
        Ok(stale)
    }

    /// Accounts matching the admin-naming heuristics.
    pub async fn suspicious_account_names(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (u:User {{domain:'{domain}'}})\n\
             WHERE {}\n\
             RETURN u.name AS userName",
            SUSPICIOUS_NAME_CLAUSES.join("\n   OR ")
        );

        let rows = self.gateway.run(&cypher, &["userName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// Users of this domain with a direct membership in a group
    /// belonging to a different domain. Same shaping as the group-level
    /// variant: every foreign target is kept.
    pub async fn foreign_group_membership(
        &self,
        domain: &str,
    ) -> Result<BTreeMap<String, std::collections::BTreeSet<String>>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (n:User)\n\
             WHERE n.name ENDS WITH ('@' + '{domain}')\n\
             WITH n\n\
             MATCH (n)-[r:MemberOf]->(m:Group)\n\
             WHERE NOT m.name ENDS WITH ('@' + '{domain}')\n\
             RETURN n.name AS userName, m.name AS foreignGroup"
        );

        let rows = self
            .gateway
            .run(&cypher, &["userName", "foreignGroup"])
            .await?;
        Ok(foreign_membership_map(rows, &domain))
    }
}

/// Interpret a cell as an epoch timestamp. The collector stores the
/// last-change attribute as epoch seconds, integer or float.
fn epoch_timestamp(cell: &CypherValue) -> Option<DateTime<Utc>> {
    let seconds = match cell {
        CypherValue::Int(i) => *i,
        CypherValue::Float(f) => *f as i64,
        _ => return None,
    };
    DateTime::from_timestamp(seconds, 0)
}
