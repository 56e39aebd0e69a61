//! Modsync CLI binary.
//!
//! Thin driver over the library session: parses arguments, initializes
//! logging, renders progress events and prints the final result.

use clap::{Parser, Subcommand};
use modsync::config::SyncConfig;
use modsync::error::SyncError;
use modsync::logging::{init_logging, LoggingConfig};
use modsync::progress::{Phase, ProgressEvent, Reporter};
use modsync::session::{Session, StateKind};
use std::path::PathBuf;
use std::process;
use tracing::error;

#[derive(Parser)]
#[command(
    name = "modsync",
    version,
    about = "Synchronize a local directory against a remote reference archive"
)]
struct Cli {
    /// Live directory to synchronize (overrides configuration)
    #[arg(long, global = true)]
    mods_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the reference archive, diff it against the live tree and print a summary
    Sync {
        /// Apply the computed diff to the live tree
        #[arg(long)]
        apply: bool,
        /// Back up the live tree before applying
        #[arg(long)]
        backup: bool,
    },
    /// Zip the live tree into a timestamped backup
    Backup,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: (if cli.verbose { "debug" } else { "info" }).to_string(),
        format: (if cli.json_logs { "json" } else { "text" }).to_string(),
        ..LoggingConfig::default()
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("command failed: {e}");
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), SyncError> {
    let mut config = SyncConfig::load()?;
    if let Some(dir) = cli.mods_dir {
        config.mods_dir = Some(dir);
    }
    let session = Session::new(config);

    let (reporter, mut rx) = Reporter::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render(&event);
        }
    });

    let result = match cli.command {
        Command::Sync { apply, backup } => run_sync(&session, apply, backup, &reporter).await,
        Command::Backup => match session.backup(&reporter).await {
            Ok(path) => {
                println!("Backup written: {}", path.display());
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    drop(reporter);
    let _ = printer.await;
    result
}

async fn run_sync(
    session: &Session,
    apply: bool,
    backup: bool,
    reporter: &Reporter,
) -> Result<(), SyncError> {
    let kind = session.check(reporter).await?;
    if kind == StateKind::NeedPath {
        return Err(SyncError::State(
            "no live directory configured; pass --mods-dir or set mods_dir".to_string(),
        ));
    }

    let names = |entries: &[modsync::types::PathEntry]| -> Vec<String> {
        entries.iter().map(|e| e.rel_path.clone()).collect()
    };
    let (deletions, additions, replacements, failures) = session
        .summary(|p| {
            (
                names(&p.diff.deletions),
                names(&p.diff.additions),
                names(&p.diff.replacements),
                p.scan_failures.len(),
            )
        })
        .ok_or_else(|| SyncError::State("check did not produce a summary".to_string()))?;

    println!(
        "Summary: {} to delete, {} to add, {} to replace",
        deletions.len(),
        additions.len(),
        replacements.len()
    );
    for path in &deletions {
        println!("  - {path}");
    }
    for path in &additions {
        println!("  + {path}");
    }
    for path in &replacements {
        println!("  ~ {path}");
    }
    if failures > 0 {
        println!("  ({failures} entries could not be hashed)");
    }

    if !apply {
        session.reset();
        return Ok(());
    }

    let report = session.apply(backup, reporter).await?;
    println!("Applied {} items", report.applied);
    if let Some(path) = &report.backup_path {
        println!("Backup written: {}", path.display());
    }
    for outcome in report.deletions.iter().filter(|o| o.is_failed()) {
        println!("  ! failed to delete {}", outcome.rel_path);
    }
    Ok(())
}

fn render(event: &ProgressEvent) {
    let phase = match event.phase {
        Phase::Default => "sync",
        Phase::Download => "download",
        Phase::Extract => "extract",
        Phase::Backup => "backup",
        Phase::Apply => "apply",
    };
    match event.percent {
        Some(percent) => eprintln!("[{phase}] {percent:>5.1}% {}", event.message),
        None => eprintln!("[{phase}] {}", event.message),
    }
}
