mod cli;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use engine_logging::{engine_error, engine_info, engine_warn, level_from_verbosity};
use harvester_engine::{
    HarvestReport, Harvester, JsonLinesSink, PlainHttpRenderer, ProxyProvider, ReqwestFetcher,
    RoundRobinProxies,
};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    logging::initialize(level_from_verbosity(args.verbosity()), args.log_file.as_deref());

    match run(&args).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                engine_error!("Could not serialize the run report: {}", err);
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            engine_error!("Harvest failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Cli) -> anyhow::Result<HarvestReport> {
    let config = args.load_config()?;

    let proxies: Arc<dyn ProxyProvider> = Arc::new(RoundRobinProxies::new(config.proxies.clone()));
    let fetcher = ReqwestFetcher::with_proxies(config.fetch.clone(), Arc::clone(&proxies));
    let renderer = PlainHttpRenderer::new(config.fetch.clone())
        .with_accept_language(config.accept_language.clone())
        .with_proxies(proxies);
    let sink = JsonLinesSink::open(&config.output)
        .with_context(|| format!("opening output {}", config.output.display()))?;
    engine_info!("Writing records to {}", sink.path().display());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!("Interrupted, finishing in-flight requests");
            on_signal.cancel();
        }
    });

    let harvester = Harvester::new(config, Arc::new(fetcher), Arc::new(renderer), Arc::new(sink));
    let report = harvester.run(cancel).await?;
    engine_info!(
        "Saved {} records, stopped: {}",
        report.counters.saved,
        report.stop_reason
    );
    Ok(report)
}
