//! Domain metrics provider
//!
//! Domain-level statistics: the domain inventory, privilege-path counts,
//! Domain Admin session exposure, GPO and OU posture, and the operating
//! system histogram. Each operation wraps exactly one graph query and
//! shapes its rows into a typed result.

use tracing::debug;

use crate::errors::Result;
use crate::gateway::{QueryGateway, Row};

pub struct DomainMetrics<'a, G> {
    gateway: &'a G,
}

impl<'a, G: QueryGateway> DomainMetrics<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Fetch the distinct domains in the dataset.
    ///
    /// With `inclusive` set, every domain node is returned regardless of
    /// data completeness; otherwise only domains that have at least one
    /// group, i.e. domains with usable data. Null or empty labels are
    /// discarded, names are uppercased, and the result is sorted for a
    /// deterministic iteration order.
    pub async fn list_domains(&self, inclusive: bool) -> Result<Vec<String>> {
        let cypher = if inclusive {
            "MATCH (d:Domain)\n\
             RETURN DISTINCT(d.name) AS domain"
        } else {
            "MATCH (g:Group)\n\
             RETURN DISTINCT(g.domain) AS domain"
        };

        let rows = self.gateway.run(cypher, &["domain"]).await?;
        let mut domains = non_empty_strings(rows);
        for domain in &mut domains {
            *domain = domain.to_uppercase();
        }
        domains.sort();
        domains.dedup();
        debug!(
            "Found {} domains (inclusive: {})",
            domains.len(),
            inclusive
        );
        Ok(domains)
    }

    /// Count of distinct nodes with a shortest path to the domain's
    /// Domain Admins group.
    pub async fn count_da_paths(&self, domain: &str) -> Result<i64> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH p = shortestPath((n {{domain:'{domain}'}})-[r*1..]->\
             (g:Group {{name:'DOMAIN ADMINS@{domain}'}}))\n\
             RETURN COUNT(DISTINCT(n)) AS pathCount"
        );

        let rows = self.gateway.run(&cypher, &["pathCount"]).await?;
        Ok(first_int(&rows))
    }

    /// Average hop count of shortest paths to the Domain Admins group.
    ///
    /// `None` when no such path exists; an absent average is never
    /// reported as zero.
    pub async fn avg_path_length(&self, domain: &str) -> Result<Option<f64>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH p = shortestPath((n {{domain:'{domain}'}})-[r*1..]->\
             (g:Group {{name:'DOMAIN ADMINS@{domain}'}}))\n\
             RETURN AVG(LENGTH(p)) AS avgPathLength"
        );

        let rows = self.gateway.run(&cypher, &["avgPathLength"]).await?;
        Ok(first_float(&rows))
    }

    /// Computers that are not domain controllers and have a session
    /// belonging to a Domain Admin, sorted ascending.
    pub async fn computers_with_da_session(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (c2:Computer)-[r3:MemberOf*1..]->\
             (g2:Group {{name:'DOMAIN CONTROLLERS@{domain}'}})\n\
             WITH COLLECT(c2.name) AS domainControllers\n\
             MATCH (c1:Computer)-[r1:HasSession]->(u1:User)-[r2:MemberOf*1..]->\
             (g1:Group {{name:'DOMAIN ADMINS@{domain}'}})\n\
             WHERE NOT (c1.name IN domainControllers)\n\
             RETURN DISTINCT(c1.name) AS computerName\n\
             ORDER BY c1.name ASC"
        );

        let rows = self.gateway.run(&cypher, &["computerName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// Distinct operating system string to count of computers reporting
    /// it, ordered by count descending.
    pub async fn operating_system_counts(&self, domain: &str) -> Result<Vec<(String, i64)>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (c:Computer {{domain:'{domain}'}})\n\
             WHERE NOT (c.OperatingSystem = \"\" OR c.OperatingSystem IS NULL)\n\
             RETURN DISTINCT(c.OperatingSystem) AS operatingSystem, \
             COUNT(c.OperatingSystem) AS total\n\
             ORDER BY total DESC"
        );

        let rows = self
            .gateway
            .run(&cypher, &["operatingSystem", "total"])
            .await?;
        Ok(counted_pairs(rows))
    }

    /// Non-empty GPO names for the domain.
    pub async fn gpo_names(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (g:GPO {{domain:'{domain}'}})\n\
             WHERE NOT (g.name IS NULL OR g.name = \"\")\n\
             RETURN g.name AS gpoName"
        );

        let rows = self.gateway.run(&cypher, &["gpoName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// OUs with the inheritance-blocking flag set.
    pub async fn blocked_inheritance_ous(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH (o:OU {{domain:'{domain}'}})\n\
             WHERE o.BlocksInheritance = True\n\
             RETURN o.name AS ouName"
        );

        let rows = self.gateway.run(&cypher, &["ouName"]).await?;
        Ok(non_empty_strings(rows))
    }

    /// Distinct admin-user count per computer, ordered descending.
    pub async fn local_admin_counts(&self, domain: &str) -> Result<Vec<(String, i64)>> {
        let domain = domain.to_uppercase();
        let cypher = format!(
            "MATCH p = (u1:User)-[r:MemberOf|AdminTo*1..]->\
             (c:Computer {{domain:'{domain}'}})\n\
             RETURN c.name AS computerName, COUNT(DISTINCT(u1)) AS adminCount\n\
             ORDER BY adminCount DESC"
        );

        let rows = self
            .gateway
            .run(&cypher, &["computerName", "adminCount"])
            .await?;
        Ok(counted_pairs(rows))
    }
}

/// First cell of the first row as an integer; counts come back as a
/// single-row aggregate.
pub(crate) fn first_int(rows: &[Row]) -> i64 {
    rows.first()
        .and_then(|row| row.first())
        .and_then(|cell| cell.as_int())
        .unwrap_or(0)
}

/// First cell of the first row as a float, `None` when the aggregate is
/// null (no qualifying rows).
pub(crate) fn first_float(rows: &[Row]) -> Option<f64> {
    rows.first()
        .and_then(|row| row.first())
        .and_then(|cell| cell.as_float())
}

/// Collect single-column string rows, dropping null and empty cells.
pub(crate) fn non_empty_strings(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| {
            row.first()
                .and_then(|cell| cell.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .collect()
}

/// Collect (name, count) rows, preserving the query's ordering.
pub(crate) fn counted_pairs(rows: Vec<Row>) -> Vec<(String, i64)> {
    rows.into_iter()
        .filter_map(|row| {
            let name = row.first().and_then(|cell| cell.as_str())?.to_string();
            let count = row.get(1).and_then(|cell| cell.as_int())?;
            Some((name, count))
        })
        .collect()
}
