//! sqlite-pg-migrate CLI - movies catalogue migration from SQLite to PostgreSQL.

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::{Config, MigrateError, MigrationSummary, Orchestrator, VerifyReport};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "Migrate the movies catalogue from SQLite to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (default: read from the environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every table in dependency order
    Run {
        /// Check source and target for consistency afterwards
        #[arg(long)]
        verify: bool,
    },

    /// Compare every field of source and target
    Verify,

    /// Validate row counts between source and target
    Validate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::from_env()?,
    };

    let mut orchestrator = Orchestrator::new(config).await?;

    match cli.command {
        Commands::Run { verify: false } => {
            let summary = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                print_summary(&summary);
            }
        }

        Commands::Run { verify: true } => {
            let (summary, reports) = orchestrator.run_and_verify().await?;

            if cli.output_json {
                let output = serde_json::json!({
                    "migration": summary,
                    "verification": reports,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_summary(&summary);
                print_verification(&reports);
            }
        }

        Commands::Verify => {
            let reports = orchestrator.verify().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_verification(&reports);
            }
        }

        Commands::Validate => {
            let counts = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("Row counts:");
                for c in &counts {
                    println!(
                        "  {} {}: source={} target={}",
                        if c.matches { "✓" } else { "✗" },
                        c.table,
                        c.source_rows,
                        c.target_rows
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &MigrationSummary) {
    let failed = summary.failed_tables();

    println!("\nMigration completed!");
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.2}s", summary.duration_seconds);
    println!(
        "  Tables: {}/{}",
        summary.tables.len() - failed.len(),
        summary.tables.len()
    );
    println!("  Rows inserted: {}", summary.rows_inserted);
    if !failed.is_empty() {
        let names: Vec<String> = failed.iter().map(ToString::to_string).collect();
        println!("  Failed tables: {}", names.join(", "));
    }
}

fn print_verification(reports: &[VerifyReport]) {
    println!("\nConsistency check passed:");
    for r in reports {
        println!("  ✓ {} ({} rows in {} batches)", r.table, r.rows, r.batches);
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}
