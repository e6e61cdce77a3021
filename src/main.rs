use clap::Parser;
use log::{error, info};
use openaq_archiver::{
    ArchiverConfig, ArchiverError, FetchController, FsBlobStore, OpenAqConnector,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Resumable bulk-downloader for OpenAQ measurements around a fixed point.
#[derive(Parser, Debug)]
#[command(name = "openaq-archiver", version, about)]
struct Args {
    /// Datastore root; overrides the DATASTORE_PATH environment variable.
    #[arg(long)]
    datastore_path: Option<PathBuf>,
}

async fn run(args: Args) -> Result<(), ArchiverError> {
    let config = ArchiverConfig::from_env(args.datastore_path)?;
    let store = FsBlobStore::new(&config.datastore).await?;
    let connector = OpenAqConnector::new(config.api_key.clone());

    let summary = FetchController::new(config, connector, store).run().await?;
    info!(
        "All done: {} locations, {} chunks downloaded, {} skipped, {} abandoned, {} pages stored",
        summary.locations,
        summary.chunks_completed,
        summary.chunks_skipped,
        summary.chunks_abandoned,
        summary.pages_stored
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // The library logs through the `log` facade; the default `tracing-log`
    // bridge picks those records up.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!("Aborting: {err}");
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            error!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}
