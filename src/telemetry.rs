use anyhow::{Context, Result};
use tracing::subscriber::set_global_default;
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

pub const DEFAULT_FILTER: &str = "info";

pub fn get_subscriber(name: String, env_filter: String) -> impl Subscriber + Sync + Send {
    // RUST_LOG wins over the filter given here.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    // Bunyan JSON lines on stdout; JsonStorageLayer keeps span fields (request_id,
    // employee_id) so they show up on every event inside a handler.
    let formatting_layer = BunyanFormattingLayer::new(name, std::io::stdout);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

pub fn init_subscriber(subscriber: impl Subscriber + Sync + Send) -> Result<()> {
    // Route `log` records from hyper, reqwest and friends into tracing.
    LogTracer::init().context("Failed to set logger")?;
    set_global_default(subscriber).context("Failed to set subscriber")?;
    Ok(())
}
