mod args;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use refundscan_core::Extractor;
use refundscan_store::CsvReport;
use refundscan_sync::CommerceClient;
use tracing_subscriber::EnvFilter;

use crate::args::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    tracing::info!("refundscan v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let client = CommerceClient::new(args.client_config(), args.retry_policy());
    let report = CsvReport::new(&args.output);
    let extractor = Extractor::new(client, args.pacer(), report);

    tracing::info!(
        start = %args.start,
        end = %args.end,
        output = %args.output.display(),
        "starting refund extraction"
    );
    let outcome = extractor
        .run(args.start, args.end)
        .await
        .context("refund extraction aborted")?;

    let summary = &outcome.summary;
    tracing::info!(
        days = summary.windows,
        pages = summary.pages,
        payments = summary.payments_inspected,
        refunds = summary.rows,
        output = %extractor.sink().path().display(),
        "extraction complete"
    );
    Ok(())
}
