use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use plum_gpu::config::EngineConfig;
use plum_gpu::search::dispatcher::SearchDispatcher;
use plum_gpu::xboard::xboard_top::{ignore_interrupts, run_stdio_loop, XboardState};

fn main() -> Result<()> {
    let config = EngineConfig::parse();

    // stdout carries the protocol; logs go to stderr.
    let filter = match &config.log_filter {
        Some(directives) => EnvFilter::try_new(directives).context("parsing --log-filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let provider = config.build_provider()?;
    info!(backend = ?config.backend, device = provider.name(), "starting engine");

    let dispatcher = SearchDispatcher::new(provider, config.search_timeout(), config.diagnostics_log());
    let mut state = XboardState::new(dispatcher, config.depth, config.limits());
    ignore_interrupts().context("installing the interrupt handler")?;
    run_stdio_loop(&mut state).context("xboard loop")?;
    Ok(())
}
