use std::{backtrace::Backtrace, panic::set_hook};

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::fmt::time::Uptime;

/// Installs the global subscriber, forwards `log` records from the driver and
/// routes panics through `tracing`.
pub fn init(level: Level) -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("Initializing log tracer")?;
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_file(true)
        .with_level(true)
        .with_line_number(true)
        .with_thread_names(true)
        .with_timer(Uptime::default())
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(sub)
        .context("Setting global default tracing subscriber")?;

    set_hook(Box::new(move |info| {
        let backtrace = Backtrace::capture();
        tracing::error!("{info}\n{backtrace}");
    }));
    Ok(())
}
