mod logging;

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use pagetally::cache::{ImportObserver, StatsCacheVersion};
use pagetally::config::{load_settings, ConfigError, Settings};
use pagetally::db::Database;
use pagetally::ingest::{EventReconciler, RosterImporter};
use pagetally::watcher::{self, FileSupervisor, IngestHandler};

#[derive(Parser)]
#[command(name = "pagetally-daemon")]
#[command(about = "Imports print events and user rosters dropped into a watch directory")]
#[command(version)]
struct Cli {
    /// Settings file (JSON). Environment variables override its values.
    #[arg(long, env = "PAGETALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Do not process files already sitting in the watch directory
    #[arg(long)]
    no_sweep: bool,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("pagetally-daemon: {}", e);
            process::exit(2);
        }
    };
    if cli.no_sweep {
        settings.watcher.startup_sweep = false;
    }

    if let Err(e) = logging::init(settings.log_format) {
        eprintln!("pagetally-daemon: failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(settings) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(settings: Settings) -> pagetally::Result<()> {
    let db_path = settings.database_path().ok_or_else(|| ConfigError::Validation {
        message: "no database path configured and no home directory found".to_string(),
    })?;
    let db = Database::open(&db_path)?;

    let observer: Arc<dyn ImportObserver> = Arc::new(StatsCacheVersion::new(db.clone()));
    let reconciler = EventReconciler::new(db.clone(), &settings.import, observer);
    let importer = RosterImporter::new(db);
    let handler = Arc::new(IngestHandler::new(reconciler, importer));
    let supervisor = FileSupervisor::new(&settings.watcher, handler);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown requested, finishing current file");
        flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    info!(
        "Watching {} (processed: {}, quarantine: {}, unknown users: {:?})",
        settings.watcher.watch_dir.display(),
        settings.watcher.processed_dir.display(),
        settings.watcher.quarantine_dir.display(),
        settings.import.unknown_user_policy,
    );
    watcher::run(&settings.watcher, &supervisor, shutdown)?;
    info!("Stopped");
    Ok(())
}
