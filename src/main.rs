//! Activity Export
//!
//! Command-line entry point: exports stored activities and activity summaries.

use activity_export::storage::config::load_settings;
use activity_export::{ExportEngine, ExportFormat, SqliteStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "activity-export", version)]
#[command(about = "Export recorded activities to TCX, GPX, FIT or CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one activity
    Export {
        /// Activity id
        id: String,

        /// Output format (tcx, gpx, fit, csv); defaults to the configured format
        #[arg(long)]
        format: Option<ExportFormat>,

        /// Activity database; defaults to the configured path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output directory; defaults to the configured directory
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Export a summary table of all activities of one type
    Summary {
        /// Activity type, e.g. "Running"
        #[arg(long = "type")]
        activity_type: String,

        /// Activity database; defaults to the configured path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output directory; defaults to the configured directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = load_settings().context("Failed to load settings")?;

    match cli.command {
        Commands::Export {
            id,
            format,
            db,
            out,
        } => {
            let db = db.unwrap_or_else(|| settings.database_path.clone());
            let out = out.unwrap_or_else(|| settings.output_dir.clone());
            let format = format.unwrap_or(settings.default_format);

            let store = SqliteStore::open(&db)
                .with_context(|| format!("Failed to open database {}", db.display()))?;
            let engine = ExportEngine::with_settings(store, &settings);

            let path = engine
                .export_activity(format, &out, &id)
                .with_context(|| format!("Failed to export activity {} as {}", id, format))?;
            println!("{}", path.display());
        }
        Commands::Summary {
            activity_type,
            db,
            out,
        } => {
            let db = db.unwrap_or_else(|| settings.database_path.clone());
            let out = out.unwrap_or_else(|| settings.output_dir.clone());

            let store = SqliteStore::open(&db)
                .with_context(|| format!("Failed to open database {}", db.display()))?;
            let engine = ExportEngine::with_settings(store, &settings);

            let path = engine
                .export_activity_summary(&activity_type, &out)
                .with_context(|| format!("Failed to export {} summary", activity_type))?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
