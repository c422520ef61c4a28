use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use embed_adblocker::{AppConfig, EdgeApplicationServer, Logger};

// stateless edge binary, nothing to connect to before serving
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // init logger and sentry, guards are kept alive to flush logs and maintain sentry connection
    let _guards = Logger::init(&config);

    info!(
        "logger and env prepped ({})...",
        Logger::environment_name(config.cargo_env)
    );

    EdgeApplicationServer::serve(config)
        .await
        .context("edge server failed to start")?;

    Ok(())
}
