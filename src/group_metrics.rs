//! Group metrics provider
//!
//! Group membership statistics: direct and transitive membership
//! averages, the built-in admin group rosters, admin-named and
//! local-admin groups, and cross-domain group membership.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain_metrics::{first_float, non_empty_strings};
use crate::errors::Result;
use crate::gateway::{QueryGateway, Row};

/// Transitive members of the three built-in administrative groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuiltinAdminMembers {
    pub domain_admins: Vec<String>,
    pub enterprise_admins: Vec<String>,
    pub builtin_administrators: Vec<String>,
}

pub struct GroupMetrics<'a, G> {
    gateway: &'a G,
}

impl<'a, G: QueryGateway> GroupMetrics<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Average number of groups each domain user is associated with.
    ///
    /// With `recursive` set the closure follows membership edges of any
    /// length; otherwise direct memberships only. Users with no
    /// qualifying membership are absent from the denominator entirely.
    /// `None` when the domain has no membership data at all.
    pub async fn avg_group_membership(&self, domain: &str, recursive: bool) -> Result<Option<f64>> {
        let domain = domain.to_uppercase();
        let hops = if recursive { "*1.." } else { "*1" };
        let cypher = format!(
            "MATCH (u:User {{domain:'{domain}'}})-[r:MemberOf{hops}]->(g:Group)\n\
             WITH u.name AS userName, COUNT(r) AS relCount\n\
             RETURN AVG(relCount) AS avgMembership"
        );

        let rows = self.gateway.run(&cypher, &["avgMembership"]).await?;
        Ok(first_float(&rows))
    }

    /// Transitive members of Domain Admins, Enterprise Admins, and the
    /// built-in Administrators group.
    pub async fn builtin_admin_members(&self, domain: &str) -> Result<BuiltinAdminMembers> {
        let domain = domain.to_uppercase();
        Ok(BuiltinAdminMembers {
            domain_admins: self.roster(&domain, "DOMAIN ADMINS").await?,
            enterprise_admins: self.roster(&domain, "ENTERPRISE ADMINS").await?,
            builtin_administrators: self.roster(&domain, "ADMINISTRATORS").await?,
        })
    }

    async fn roster(&self, domain: &str, group: &str) -> Result<Vec<String>> {
        let cypher = format!(
            "MATCH (n:Group {{name:'{group}@{domain}'}})<-[r:MemberOf*1..]-(m)\n\
             RETURN DISTINCT(m.name) AS memberName"
        );

        let rows = self.gateway.run(&cypher, &["memberName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// Groups with ADMIN in their name, case-insensitively, excluding the
    /// three built-in administrative groups.
    pub async fn admin_like_groups(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (g:Group {{domain:'{domain}'}})\n\
             WHERE g.name =~ '(?i).*ADMIN.*'\n\
             AND NOT g.name IN {}\n\
             RETURN g.name AS groupName",
            builtin_group_list(&domain)
        );

        let rows = self.gateway.run(&cypher, &["groupName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// Non-built-in groups with a transitive local-admin edge to a
    /// computer.
    pub async fn local_admin_groups(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (g:Group {{domain:'{domain}'}})-[:AdminTo*1..]->(c:Computer)\n\
             WHERE NOT g.name IN {}\n\
             RETURN DISTINCT(g.name) AS groupName",
            builtin_group_list(&domain)
        );

        let rows = self.gateway.run(&cypher, &["groupName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// Groups of this domain that are members, directly or transitively,
    /// of a group belonging to a different domain.
    ///
    /// Keyed by the local group; the value holds every foreign target.
    /// A group with several foreign memberships reports all of them --
    /// collapsing to a single arbitrary target would hide exposure.
    pub async fn foreign_group_membership(
        &self,
        domain: &str,
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (n:Group)\n\
             WHERE n.name ENDS WITH ('@' + '{domain}')\n\
             WITH n\n\
             MATCH (n)-[r:MemberOf*1..]->(m:Group)\n\
             WHERE NOT m.name ENDS WITH ('@' + '{domain}')\n\
             RETURN n.name AS localGroup, m.name AS foreignGroup"
        );

        let rows = self
            .gateway
            .run(&cypher, &["localGroup", "foreignGroup"])
            .await?;
        Ok(foreign_membership_map(rows, &domain))
    }

    /// Transitive membership closure into a specific named group.
    pub async fn members_of_group(&self, domain: &str, group_name: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let group_name = group_name.to_uppercase();
        let cypher = format!(
            "MATCH (n)-[r:MemberOf*1..]->(g:Group {{name:'{group_name}@{domain}'}})\n\
             RETURN DISTINCT(n.name) AS memberName"
        );

        let rows = self.gateway.run(&cypher, &["memberName"]).await?;
        Ok(non_empty_strings(rows))
    }
}

fn builtin_group_list(domain: &str) -> String {
    format!(
        "['DOMAIN ADMINS@{domain}', 'ENTERPRISE ADMINS@{domain}', 'ADMINISTRATORS@{domain}']"
    )
}

/// Shape (local, foreign) pairs into a map keyed by the local principal.
///
/// The domain anchor check is exact and case-sensitive on `"@" + domain`:
/// keys must carry the anchor, targets must not.
pub(crate) fn foreign_membership_map(
    rows: Vec<Row>,
    domain: &str,
) -> BTreeMap<String, BTreeSet<String>> {
    let anchor = format!("@{domain}");
    let mut memberships: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in rows {
        let local = match row.first().and_then(|cell| cell.as_str()) {
            Some(name) if name.ends_with(&anchor) => name.to_string(),
            _ => continue,
        };
        let foreign = match row.get(1).and_then(|cell| cell.as_str()) {
            Some(name) if !name.is_empty() && !name.ends_with(&anchor) => name.to_string(),
            _ => continue,
        };
        memberships.entry(local).or_default().insert(foreign);
    }
    memberships
}
