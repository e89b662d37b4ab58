//! Application entrypoint and state wiring.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mangochain::{
    config::load_settings,
    journey::{shared, MangoChain},
    routes::{router, AppState},
    scan::{run_scanner, LineScanSource, ScanSummary},
    Verdict,
};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mangochain", version, about = "Mango supply-chain ledger demo")]
struct Args {
    /// Settings file; defaults to ./mangochain.toml when present
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the demo API for the browser page
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Verify decoded QR strings read line by line from stdin
    Scan {
        /// Batch to treat as current
        #[arg(long)]
        batch: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                settings.bind_addr = bind;
            }
            let addr: SocketAddr = settings
                .bind_addr
                .parse()
                .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;

            let state = AppState::new(&settings);
            info!(batch = %mangochain::journey::lock(&state.chain).batch(), "session ready");
            let app = router(state);

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!("running on http://{addr}");
            axum::serve(listener, app).await.context("server error")?;
        }
        Command::Scan { batch } => {
            if let Some(batch) = batch {
                settings.farm.initial_batch = batch;
            }
            settings.farm.validate()?;
            let chain = shared(MangoChain::new(settings.farm));
            let mut source = LineScanSource::new(BufReader::new(tokio::io::stdin()));

            match run_scanner(&mut source, &chain).await {
                ScanSummary::Scanned(Verdict::Match(product)) => {
                    println!("{}", serde_json::to_string_pretty(&product)?);
                }
                ScanSummary::Scanned(Verdict::NoMatch { preview }) => {
                    anyhow::bail!("not a MangoChain QR code: {preview}");
                }
                ScanSummary::Stopped => info!("no QR payload received"),
                ScanSummary::CameraFailed(error) => return Err(error.into()),
            }
        }
    }

    Ok(())
}
