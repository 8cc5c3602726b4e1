use std::net::SocketAddr;

use anyhow::Result;
use tracing::info;

use fieldsheet::api;
use fieldsheet::config::Settings;
use fieldsheet::telemetry::{get_subscriber, init_subscriber, DEFAULT_FILTER};
use fieldsheet::ActivityGateway;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = get_subscriber("fieldsheet".into(), DEFAULT_FILTER.into());
    init_subscriber(subscriber)?;

    let settings = Settings::from_env()?;
    let store = settings.connect_store()?;
    let gateway = ActivityGateway::new(store, settings.employee_table.clone());

    run(settings.address(), gateway).await;

    Ok(())
}

async fn run(address: SocketAddr, gateway: ActivityGateway) {
    info!(%address, "starting server");
    warp::serve(api::routes(gateway)).run(address).await;
}
