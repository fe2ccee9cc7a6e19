use std::io;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use graphhound::config::ConnectionConfig;
use graphhound::domain_discovery::prepare_domain_set;
use graphhound::domain_metrics::DomainMetrics;
use graphhound::gateway::Neo4jGateway;
use graphhound::report::run_batch;
use graphhound::Result;

/// Reporting and risk-analysis companion for Active Directory
/// attack-path graph data.
#[derive(Parser, Debug)]
#[command(name = "graphhound", version, about)]
struct Cli {
    /// Restrict the analysis to a single Active Directory domain.
    #[arg(short, long)]
    domain: Option<String>,

    /// Password age in months for the stale-credential check.
    #[arg(long = "pass-age", value_name = "MONTHS", default_value_t = 6)]
    pass_age: u32,

    /// Path to the connection configuration file.
    #[arg(long, value_name = "FILE", default_value = "database.toml")]
    config: PathBuf,

    /// Emit the full report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("[X] {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConnectionConfig::load(&cli.config)?;
    let gateway = Neo4jGateway::connect(&config).await?;

    let domain_metrics = DomainMetrics::new(&gateway);
    let (domains, missing_data) =
        prepare_domain_set(&domain_metrics, cli.domain.as_deref()).await?;

    let stdout = io::stdout();
    let report = if cli.json {
        // Analysis output goes to the JSON document only.
        let mut sink = io::sink();
        let report = run_batch(&gateway, &domains, missing_data, cli.pass_age, &mut sink).await?;
        serde_json::to_writer_pretty(stdout.lock(), &report)
            .map_err(|e| graphhound::AuditError::Io(io::Error::other(e)))?;
        println!();
        report
    } else {
        let mut out = stdout.lock();
        run_batch(&gateway, &domains, missing_data, cli.pass_age, &mut out).await?
    };

    info!(
        "Run complete: {} domain(s), {} users across domains",
        report.domains.len(),
        report.totals.total_users
    );
    Ok(())
}

/// Console and file logging. The file layer writes graphhound.log next
/// to the working directory without ANSI escapes; RUST_LOG overrides
/// the default info filter.
fn init_tracing() {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, "graphhound.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(true)
        .with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    // Keep the non-blocking writer alive for the life of the process.
    std::mem::forget(guard);
}
