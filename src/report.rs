//! Cross-domain aggregation and report rendering
//!
//! Drives the per-domain analysis in order, accumulates the cross-domain
//! totals, and renders the structured text report as each domain
//! completes. Skipped domains surface their warning inline and
//! contribute nothing to the totals.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain_analysis::{
    DomainAnalysis, DomainAnalyzer, DomainReport, SkippedDomain, REMOTE_ACCESS_GROUP,
};
use crate::domain_discovery::MissingDataRecommendation;
use crate::errors::Result;
use crate::gateway::QueryGateway;

/// Running sums across all successfully analyzed domains in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTotals {
    pub total_users: i64,
    pub total_enabled_users: i64,
    pub total_computers: i64,
}

impl AggregateTotals {
    fn absorb(&mut self, analysis: &DomainAnalysis) {
        self.total_users += analysis.total_users;
        self.total_enabled_users += analysis.total_enabled_users;
        self.total_computers += analysis.total_computers;
    }
}

/// The complete result of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub domains: Vec<DomainReport>,
    pub missing_data: Vec<MissingDataRecommendation>,
    pub totals: AggregateTotals,
    pub pass_age_months: u32,
}

/// Analyze every domain in order, rendering each section as it
/// completes, then the cross-domain totals.
///
/// Per-domain data-quality conditions never fail the batch; only a data
/// source fault propagates.
pub async fn run_batch<G: QueryGateway, W: Write>(
    gateway: &G,
    domains: &[String],
    missing_data: Vec<MissingDataRecommendation>,
    pass_age_months: u32,
    out: &mut W,
) -> Result<BatchReport> {
    let analyzer = DomainAnalyzer::new(gateway, pass_age_months);
    let mut totals = AggregateTotals::default();
    let mut reports = Vec::with_capacity(domains.len());

    render_missing_data(&missing_data, out)?;

    for domain in domains {
        let report = analyzer.analyze_domain(domain).await?;
        match &report {
            DomainReport::Analyzed(analysis) => {
                totals.absorb(analysis);
                render_domain_section(analysis, pass_age_months, out)?;
            }
            DomainReport::Skipped(skipped) => render_skipped(skipped, out)?,
        }
        reports.push(report);
    }

    render_totals(&totals, out)?;
    info!(
        "Batch complete: {} domains analyzed, {} users total",
        reports.len(),
        totals.total_users
    );

    Ok(BatchReport {
        domains: reports,
        missing_data,
        totals,
        pass_age_months,
    })
}

fn render_missing_data<W: Write>(
    missing: &[MissingDataRecommendation],
    out: &mut W,
) -> Result<()> {
    if missing.is_empty() {
        return Ok(());
    }
    writeln!(
        out,
        "[!] The following domains were found in the dataset, but no data has been \
         collected for them. Run a collection against these domains:"
    )?;
    for recommendation in missing {
        writeln!(out, "\t* {}", recommendation.domain)?;
    }
    Ok(())
}

fn render_skipped<W: Write>(skipped: &SkippedDomain, out: &mut W) -> Result<()> {
    writeln!(out, "\n[+] Domain: {}", skipped.domain)?;
    writeln!(out, "[!] {}", skipped.warning)?;
    Ok(())
}

fn render_domain_section<W: Write>(
    analysis: &DomainAnalysis,
    pass_age_months: u32,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "\n[+] Domain: {}", analysis.domain)?;
    for warning in &analysis.warnings {
        writeln!(out, "[!] {}", warning)?;
    }

    // Domain facts
    writeln!(out, "L.. Number of GPOs:\t\t\t\t{}", analysis.gpo_names.len())?;
    writeln!(out, "L.. GPOs:")?;
    write_list(out, &analysis.gpo_names)?;
    writeln!(out, "L.. OUs blocking GPO inheritance:")?;
    write_list(out, &analysis.blocked_inheritance_ous)?;
    writeln!(out, "L.. Operating systems seen in domain:")?;
    if analysis.operating_systems.is_empty() {
        writeln!(out, "\tNone")?;
    }
    for (operating_system, count) in &analysis.operating_systems {
        writeln!(out, "\t{}\t{}", count, operating_system)?;
    }
    writeln!(out, "L.. Domain Admins tied to SPNs:")?;
    write_list(out, &analysis.domain_admins_with_spn)?;

    // Session exposures
    writeln!(
        out,
        "L.. Systems that are not Domain Controllers with Domain Admin sessions:"
    )?;
    if analysis.da_session_computers.is_empty() {
        writeln!(out, "\tNone! :D")?;
    }
    for computer in &analysis.da_session_computers {
        writeln!(out, "\t{}", computer)?;
    }
    writeln!(out, "L.. Local admins per computer:")?;
    if analysis.local_admin_counts.is_empty() {
        writeln!(out, "\tNone")?;
    }
    for (computer, count) in &analysis.local_admin_counts {
        writeln!(out, "\t{}\t{}", count, computer)?;
    }

    // Group membership statistics
    writeln!(
        out,
        "L.. Average group membership:\t\t\t{}",
        format_average(analysis.avg_membership_direct)
    )?;
    writeln!(
        out,
        "L.. Average recursive group membership:\t\t{}",
        format_average(analysis.avg_membership_recursive)
    )?;
    writeln!(
        out,
        "L.. Nested groups increased membership by:\t{}",
        format_average(analysis.membership_delta)
    )?;
    writeln!(out, "L.. Domain Admins:")?;
    write_list(out, &analysis.builtin_admins.domain_admins)?;
    writeln!(out, "L.. Enterprise Admins:")?;
    write_list(out, &analysis.builtin_admins.enterprise_admins)?;
    writeln!(out, "L.. Builtin Administrators:")?;
    write_list(out, &analysis.builtin_admins.builtin_administrators)?;
    writeln!(out, "L.. Admin groups:")?;
    write_list(out, &analysis.admin_like_groups)?;
    writeln!(out, "L.. Non-admin groups with local admin rights:")?;
    write_list(out, &analysis.local_admin_groups)?;
    writeln!(out, "L.. Groups with foreign group membership:")?;
    if analysis.foreign_group_membership.is_empty() {
        writeln!(out, "\tNone")?;
    }
    for (group, targets) in &analysis.foreign_group_membership {
        for target in targets {
            writeln!(out, "\t{} -> {}", group, target)?;
        }
    }
    writeln!(out, "L.. Members of {}:", REMOTE_ACCESS_GROUP)?;
    write_list(out, &analysis.remote_access_members)?;

    // User and computer statistics
    writeln!(out, "L.. Total users:\t\t\t\t{}", analysis.total_users)?;
    writeln!(
        out,
        "L.. Total enabled users:\t\t\t{} ({} disabled)",
        analysis.total_enabled_users,
        analysis.disabled_users()
    )?;
    writeln!(out, "L.. Total computers:\t\t\t\t{}", analysis.total_computers)?;
    writeln!(
        out,
        "L.. Total paths to Domain Admin:\t\t{}",
        analysis.da_paths
    )?;
    writeln!(
        out,
        "L.. Average path length:\t\t\t{}",
        format_average(analysis.avg_path_length)
    )?;
    writeln!(
        out,
        "L.. Users with path to a Domain Admin:\t\t{:.1}%",
        analysis.pct_users_with_path_to_da
    )?;
    writeln!(
        out,
        "L.. Machines with path to a Domain Admin:\t{:.1}%",
        analysis.pct_computers_with_path_to_da
    )?;
    writeln!(
        out,
        "L.. Users with passwords older than {} months:\t{}",
        pass_age_months,
        analysis.stale_credentials.len()
    )?;
    for (user, changed_at) in &analysis.stale_credentials {
        writeln!(
            out,
            "\t{}\t(last set {})",
            user,
            changed_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
    }
    writeln!(out, "L.. Computers with unconstrained delegation:")?;
    write_list(out, &analysis.unconstrained_delegation_computers)?;
    writeln!(out, "L.. Potentially privileged accounts:")?;
    write_list(out, &analysis.suspicious_accounts)?;
    writeln!(out, "L.. Users with foreign group membership:")?;
    if analysis.user_foreign_membership.is_empty() {
        writeln!(out, "\tNone")?;
    }
    for (user, targets) in &analysis.user_foreign_membership {
        for target in targets {
            writeln!(out, "\t{} -> {}", user, target)?;
        }
    }

    Ok(())
}

fn render_totals<W: Write>(totals: &AggregateTotals, out: &mut W) -> Result<()> {
    writeln!(
        out,
        "\n[*] Total users across domains:\t\t\t{}",
        totals.total_users
    )?;
    writeln!(
        out,
        "[*] Total enabled users across domains:\t\t{}",
        totals.total_enabled_users
    )?;
    writeln!(
        out,
        "[*] Total computers across domains:\t\t{}",
        totals.total_computers
    )?;
    Ok(())
}

fn write_list<W: Write>(out: &mut W, items: &[String]) -> Result<()> {
    if items.is_empty() {
        writeln!(out, "\tNone")?;
    }
    for item in items {
        writeln!(out, "\t{}", item)?;
    }
    Ok(())
}

fn format_average(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.2}", value),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{int_row, str_row, FakeGateway};
    use crate::gateway::CypherValue;

    /// CONTOSO answers for a healthy domain, EMPTY answers nothing so
    /// its direct membership average is undefined.
    fn batch_gateway() -> FakeGateway {
        FakeGateway::new()
            .with("@CONTOSO", vec![int_row(10)])
            .with("enabledUserCount", vec![int_row(80)])
            .with("userCount", vec![int_row(100)])
            .with("computerCount", vec![int_row(25)])
            .with("gpoName", vec![str_row("Default Domain Policy")])
            .with("operatingSystem", vec![vec![
                CypherValue::Str("Windows 10 Pro".into()),
                CypherValue::Int(25),
            ]])
            .with(
                "{domain:'CONTOSO'})-[r:MemberOf*1..]->(g:Group)",
                vec![vec![CypherValue::Float(9.5)]],
            )
            .with(
                "{domain:'CONTOSO'})-[r:MemberOf*1]->(g:Group)",
                vec![vec![CypherValue::Float(4.0)]],
            )
    }

    #[tokio::test]
    async fn test_totals_exclude_skipped_domains() {
        let gateway = batch_gateway();
        let domains = vec!["CONTOSO".to_string(), "EMPTY".to_string()];
        let mut out = Vec::new();

        let report = run_batch(&gateway, &domains, Vec::new(), 6, &mut out)
            .await
            .unwrap();

        assert_eq!(
            report.totals,
            AggregateTotals {
                total_users: 100,
                total_enabled_users: 80,
                total_computers: 25,
            }
        );
        assert_eq!(report.domains.len(), 2);
        assert!(matches!(report.domains[1], DomainReport::Skipped(_)));
    }

    #[tokio::test]
    async fn test_rendered_sections_and_ordering() {
        let gateway = batch_gateway();
        let domains = vec!["CONTOSO".to_string(), "EMPTY".to_string()];
        let mut out = Vec::new();

        run_batch(&gateway, &domains, Vec::new(), 6, &mut out)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        let contoso = text.find("[+] Domain: CONTOSO").unwrap();
        let empty = text.find("[+] Domain: EMPTY").unwrap();
        let totals = text.find("[*] Total users across domains:").unwrap();
        assert!(contoso < empty && empty < totals);

        assert!(text.contains("L.. Total enabled users:\t\t\t80 (20 disabled)"));
        assert!(text.contains("Users with path to a Domain Admin:\t\t10.0%"));
        assert!(text.contains("Group membership data is missing for this domain"));
        assert!(text.contains("Missing CollectionMethod: Group"));
    }

    #[tokio::test]
    async fn test_missing_data_recommendations_are_rendered() {
        let gateway = batch_gateway();
        let missing = vec![MissingDataRecommendation {
            domain: "PARTNER".to_string(),
        }];
        let mut out = Vec::new();

        let report = run_batch(
            &gateway,
            &["CONTOSO".to_string()],
            missing.clone(),
            6,
            &mut out,
        )
        .await
        .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("\t* PARTNER"));
        assert_eq!(report.missing_data, missing);
    }

    #[tokio::test]
    async fn test_batch_is_idempotent() {
        let gateway = batch_gateway();
        let domains = vec!["CONTOSO".to_string(), "EMPTY".to_string()];

        let mut first = Vec::new();
        let first_report = run_batch(&gateway, &domains, Vec::new(), 6, &mut first)
            .await
            .unwrap();
        let mut second = Vec::new();
        let second_report = run_batch(&gateway, &domains, Vec::new(), 6, &mut second)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first_report.totals, second_report.totals);
    }

    #[tokio::test]
    async fn test_gateway_fault_fails_the_batch() {
        let gateway = FakeGateway::failing();
        let mut out = Vec::new();

        let result = run_batch(&gateway, &["CONTOSO".to_string()], Vec::new(), 6, &mut out).await;
        assert!(result.is_err());
    }
}
