use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use journey_import::config::{ExportConfig, ImportConfig};
use journey_import::export::ExportPipeline;
use journey_import::import::ImportPipeline;
use journey_import::store::PgJourneyStore;

#[derive(Parser)]
#[command(name = "journey-import", about = "Carpool journey CSV import/export")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a semicolon-delimited journey CSV file
    Import {
        /// Path to the CSV file (first row is a header and is skipped)
        #[arg(long)]
        file: PathBuf,
    },
    /// Export stored journeys as JSON pages on stdout
    Export,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable is required")?;
    let store = Arc::new(PgJourneyStore::connect(&database_url, 5).await?);
    store.ensure_schema().await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, shutting down");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Command::Import { file } => {
            let reader = BufReader::new(File::open(&file)?);
            log::info!("importing {}", file.display());

            let pipeline = ImportPipeline::new(store, ImportConfig::from_env());
            let outcome = pipeline.run(reader, cancel).await;

            for error in &outcome.errors {
                eprintln!("{error}");
            }
            println!(
                "{}",
                serde_json::json!({
                    "inserted": outcome.inserted,
                    "errors": outcome.errors.len(),
                })
            );
        }
        Command::Export => {
            let pipeline = ExportPipeline::new(store, ExportConfig::from_env());
            let mut stream = pipeline.run(cancel);

            // Drain errors concurrently so a failing source cannot stall
            // the page stream.
            let mut errors = stream.errors;
            let error_task = tokio::spawn(async move {
                while let Some(error) = errors.recv().await {
                    eprintln!("{error}");
                }
            });

            let mut exported = 0usize;
            while let Some(page) = stream.pages.recv().await {
                exported += page.len();
                println!("{}", serde_json::to_string(&page)?);
            }

            stream.handle.await?;
            error_task.await?;
            log::info!("export complete: {exported} journeys");
        }
    }

    Ok(())
}
