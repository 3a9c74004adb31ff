use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cardkeep::clock::{Clock, SystemClock};
use cardkeep::config::{default_config_path, ResolvedConfig};
use cardkeep::convert;
use cardkeep::credentials::{PortalCredentials, SessionCache};
use cardkeep::dashboard;
use cardkeep::insights::{GeminiProvider, InsightsService};
use cardkeep::markdown;
use cardkeep::models::StatementFile;
use cardkeep::portal::MaxPortal;
use cardkeep::reconcile::{self, ReconcileStatus};

#[derive(Parser)]
#[command(name = "cardkeep")]
#[command(about = "Credit card statement tracker")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the bundled demo data instead of the portal and the LLM API.
    /// Also enabled by CARDKEEP_DEMO=1.
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Full pipeline: fetch, convert, reconcile, insights, dashboard
    Run,
    /// Download statements from the portal and convert them
    Fetch,
    /// Convert specific statement files to markdown
    Convert { files: Vec<PathBuf> },
    /// Re-run reconciliation over the data directory
    Reconcile,
    /// Generate LLM spending insights
    Insights,
    /// Serve the dashboard over existing data
    Dashboard,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cardkeep=debug")),
        )
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data dir: {}", config.data_dir.display()))?;

    let demo = cli.demo || std::env::var("CARDKEEP_DEMO").is_ok_and(|v| v == "1");
    if demo {
        info!("Demo mode");
    }

    let clock = SystemClock;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_pipeline(&config, &clock, demo).await,
        Command::Fetch => {
            let files = fetch_statements(&config, &clock).await?;
            convert_files(&files);
            print_reconcile_report(&reconcile::reconcile_downloads(
                &files,
                reconcile::default_tolerance(),
            ));
            Ok(())
        }
        Command::Convert { files } => {
            for path in files {
                match convert::convert_path(&path) {
                    Ok(out) => println!("{} -> {}", path.display(), out.display()),
                    Err(e) => warn!(path = %path.display(), error = %e, "Conversion failed"),
                }
            }
            Ok(())
        }
        Command::Reconcile => {
            let files = scan_data_dir(&config.data_dir)?;
            print_reconcile_report(&reconcile::reconcile_downloads(
                &files,
                reconcile::default_tolerance(),
            ));
            Ok(())
        }
        Command::Insights => {
            if demo {
                let path = cardkeep::insights::demo_insights_path(&config.data_dir);
                println!("{}", cardkeep::insights::read_insights(&path)?);
                return Ok(());
            }
            let service = insights_service(&config)?;
            let path = service.generate(&clock, false).await?;
            println!("{}", cardkeep::insights::read_insights(&path)?);
            println!("\nSaved to {}", path.display());
            Ok(())
        }
        Command::Dashboard => serve_dashboard(&config, demo).await,
        Command::Config => {
            println!("Config file: {}", config_path.display());
            println!("Data directory: {}", config.data_dir.display());
            println!(
                "Portal credentials: {}",
                if config.portal.is_some() {
                    "configured"
                } else {
                    "not configured"
                }
            );
            println!(
                "Gemini insights: {}",
                if config.gemini.api_key.is_some() {
                    "configured"
                } else {
                    "not configured"
                }
            );
            println!("Dashboard: http://{}", config.dashboard.listen);
            Ok(())
        }
    }
}

/// The original one-command flow: download everything, convert, reconcile,
/// ask for insights when configured, then leave the dashboard running.
async fn run_pipeline(config: &ResolvedConfig, clock: &dyn Clock, demo: bool) -> Result<()> {
    if demo {
        convert_demo_files(&config.data_dir);
        return serve_dashboard(config, true).await;
    }

    let files = fetch_statements(config, clock).await?;
    convert_files(&files);
    print_reconcile_report(&reconcile::reconcile_downloads(
        &files,
        reconcile::default_tolerance(),
    ));

    match insights_service(config) {
        Ok(service) => {
            match service.generate(clock, false).await {
                Ok(path) => info!(path = %path.display(), "Insights ready"),
                Err(e) => warn!(error = %e, "Insights generation failed, continuing"),
            };
        }
        Err(e) => info!(reason = %e, "Skipping insights"),
    }

    serve_dashboard(config, false).await
}

async fn fetch_statements(
    config: &ResolvedConfig,
    clock: &dyn Clock,
) -> Result<Vec<StatementFile>> {
    let cred_config = config
        .portal
        .as_ref()
        .context("No [portal] credentials configured - add them to cardkeep.toml")?;
    let store = cred_config.build();
    let credentials = PortalCredentials::from_store(store.as_ref()).await?;

    let session_cache = SessionCache::with_path(config.sessions_dir())?;
    let portal = MaxPortal::launch(
        &config.downloads_dir(),
        &config.profile_dir(),
        session_cache,
        config.fetch.clone(),
        clock,
    )
    .await?;

    let flow = async {
        portal.login(&credentials).await?;
        let files = portal.download_statements(clock).await?;
        if let Err(e) = portal.save_session(clock).await {
            warn!(error = %e, "Failed to save portal session");
        }
        Ok::<_, anyhow::Error>(files)
    }
    .await;

    portal.close().await.ok();

    let files = flow?;
    info!(count = files.len(), "Downloaded statement files");
    Ok(files)
}

fn convert_files(files: &[StatementFile]) {
    for file in files {
        if let Err(e) = convert::to_markdown(file) {
            warn!(path = %file.path.display(), error = %e, "Conversion failed, continuing");
        }
    }
}

fn convert_demo_files(data_dir: &Path) {
    let demo_files: Vec<PathBuf> = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().and_then(|e| e.to_str()) == Some("xlsx")
                    && p.file_stem()
                        .and_then(|s| s.to_str())
                        .is_some_and(|s| s.starts_with("demo"))
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "Failed to list demo files");
            return;
        }
    };

    for path in demo_files {
        match convert::convert_path(&path) {
            Ok(out) => info!(path = %out.display(), "Converted demo file"),
            Err(e) => warn!(path = %path.display(), error = %e, "Demo conversion failed"),
        }
    }
}

fn scan_data_dir(data_dir: &Path) -> Result<Vec<StatementFile>> {
    let files: Vec<StatementFile> = std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read data dir: {}", data_dir.display()))?
        .filter_map(|e| e.ok())
        .filter_map(|e| StatementFile::from_path(e.path()))
        .collect();
    Ok(files)
}

fn insights_service(config: &ResolvedConfig) -> Result<InsightsService> {
    let provider = GeminiProvider::from_config(&config.gemini)?;
    Ok(InsightsService::new(
        config.data_dir.clone(),
        Box::new(provider),
    ))
}

async fn serve_dashboard(config: &ResolvedConfig, demo: bool) -> Result<()> {
    let transactions = markdown::load_transactions(&config.data_dir, demo)?;
    if transactions.is_empty() {
        warn!("No transactions found - the dashboard will be empty");
    }
    println!("Dashboard: http://{}", config.dashboard.listen);
    dashboard::serve(&config.dashboard.listen, transactions).await
}

fn print_reconcile_report(report: &reconcile::ReconcileReport) {
    for entry in &report.months {
        let month = entry
            .month
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match entry.status {
            ReconcileStatus::Matched => println!("{month}: sums OK"),
            ReconcileStatus::Mismatched => {
                println!("{month}: MISMATCH");
                for cmp in entry.comparisons.iter().filter(|c| !c.matched) {
                    match cmp.spreadsheet_total {
                        Some(sheet) => println!(
                            "  document: {} spreadsheet: {sheet}",
                            cmp.document_total
                        ),
                        None => println!("  document: {} spreadsheet: missing", cmp.document_total),
                    }
                }
            }
            ReconcileStatus::MissingCounterpart => {
                println!("{month}: no spreadsheet to compare against")
            }
            ReconcileStatus::Unreadable => println!("{month}: could not extract totals"),
        }
    }
    if report.months.is_empty() {
        println!("Nothing to reconcile (no statement documents found).");
    }
}
