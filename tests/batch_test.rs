//! End-to-end batch run over a canned gateway: discovery, per-domain
//! analysis, skip handling, and cross-domain totals.

use graphhound::domain_analysis::DomainReport;
use graphhound::domain_discovery::prepare_domain_set;
use graphhound::domain_metrics::DomainMetrics;
use graphhound::gateway::{CypherValue, QueryGateway, Row};
use graphhound::report::{run_batch, AggregateTotals};
use graphhound::{AuditError, Result};

/// Answers each query by the first configured marker found in its text.
struct CannedGateway {
    responses: Vec<(&'static str, Vec<Row>)>,
}

impl CannedGateway {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
        }
    }

    fn with(mut self, marker: &'static str, rows: Vec<Row>) -> Self {
        self.responses.push((marker, rows));
        self
    }
}

impl QueryGateway for CannedGateway {
    async fn run(&self, cypher: &str, _columns: &[&str]) -> Result<Vec<Row>> {
        for (marker, rows) in &self.responses {
            if cypher.contains(marker) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }
}

fn s(value: &str) -> CypherValue {
    CypherValue::Str(value.to_string())
}

fn int_row(value: i64) -> Vec<CypherValue> {
    vec![CypherValue::Int(value)]
}

/// The dataset knows three domains. CONTOSO is healthy, EMPTY has no
/// group-membership data, PARTNER has no data at all.
fn dataset() -> CannedGateway {
    CannedGateway::new()
        // Inventories
        .with(
            "(d:Domain)",
            vec![vec![s("CONTOSO")], vec![s("EMPTY")], vec![s("PARTNER")]],
        )
        .with(
            "DISTINCT(g.domain)",
            vec![vec![s("CONTOSO")], vec![s("EMPTY")]],
        )
        // CONTOSO group statistics
        .with(
            "{domain:'CONTOSO'})-[r:MemberOf*1..]->(g:Group)",
            vec![vec![CypherValue::Float(9.5)]],
        )
        .with(
            "{domain:'CONTOSO'})-[r:MemberOf*1]->(g:Group)",
            vec![vec![CypherValue::Float(4.0)]],
        )
        // CONTOSO facts and counts
        .with("gpoName", vec![vec![s("Default Domain Policy")]])
        .with(
            "operatingSystem",
            vec![vec![s("Windows 10 Pro"), CypherValue::Int(40)]],
        )
        .with("enabledUserCount", vec![int_row(80)])
        .with("userCount", vec![int_row(100)])
        .with("computerCount", vec![int_row(0)])
        .with("pathCount", vec![int_row(10)])
        .with("avgPathLength", vec![vec![CypherValue::Float(5.0)]])
}

#[tokio::test]
async fn full_batch_report() {
    let gateway = dataset();
    let metrics = DomainMetrics::new(&gateway);

    let (domains, missing) = prepare_domain_set(&metrics, None).await.unwrap();
    assert_eq!(domains, vec!["CONTOSO", "EMPTY"]);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].domain, "PARTNER");

    let mut out = Vec::new();
    let report = run_batch(&gateway, &domains, missing, 6, &mut out)
        .await
        .unwrap();

    // Totals cover exactly the domains that were not skipped.
    assert_eq!(
        report.totals,
        AggregateTotals {
            total_users: 100,
            total_enabled_users: 80,
            total_computers: 0,
        }
    );

    match &report.domains[0] {
        DomainReport::Analyzed(analysis) => {
            assert_eq!(analysis.domain, "CONTOSO");
            assert_eq!(analysis.da_paths, 10);
            assert_eq!(analysis.pct_users_with_path_to_da, 10.0);
            // Zero computers divides to zero, never an error.
            assert_eq!(analysis.pct_computers_with_path_to_da, 0.0);
            assert_eq!(analysis.membership_delta, Some(5.5));
        }
        DomainReport::Skipped(_) => panic!("CONTOSO must be analyzed"),
    }
    match &report.domains[1] {
        DomainReport::Skipped(skipped) => assert_eq!(skipped.domain, "EMPTY"),
        DomainReport::Analyzed(_) => panic!("EMPTY must be skipped"),
    }

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("\t* PARTNER"));
    assert!(text.contains("[+] Domain: CONTOSO"));
    assert!(text.contains("Users with path to a Domain Admin:\t\t10.0%"));
    assert!(text.contains("Machines with path to a Domain Admin:\t0.0%"));
    assert!(text.contains("[+] Domain: EMPTY"));
    assert!(text.contains("Missing CollectionMethod: Group"));
    assert!(text.contains("[*] Total users across domains:\t\t\t100"));
}

#[tokio::test]
async fn single_domain_run_rejects_unknown_domain() {
    let gateway = dataset();
    let metrics = DomainMetrics::new(&gateway);

    let err = prepare_domain_set(&metrics, Some("FABRIKAM"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::UnknownDomain { .. }));
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let gateway = dataset();
    let metrics = DomainMetrics::new(&gateway);
    let (domains, _) = prepare_domain_set(&metrics, None).await.unwrap();

    let mut first = Vec::new();
    let first_totals = run_batch(&gateway, &domains, Vec::new(), 6, &mut first)
        .await
        .unwrap()
        .totals;
    let mut second = Vec::new();
    let second_totals = run_batch(&gateway, &domains, Vec::new(), 6, &mut second)
        .await
        .unwrap()
        .totals;

    assert_eq!(first, second);
    assert_eq!(first_totals, second_totals);
}

#[tokio::test]
async fn json_report_round_trips() {
    let gateway = dataset();
    let domains = vec!["CONTOSO".to_string()];
    let mut out = std::io::sink();

    let report = run_batch(&gateway, &domains, Vec::new(), 6, &mut out)
        .await
        .unwrap();

    let json = serde_json::to_string(&report).unwrap();
    let parsed: graphhound::BatchReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.totals, report.totals);
    assert_eq!(parsed.pass_age_months, 6);
}
