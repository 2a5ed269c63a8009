mod app;
mod config;
mod detection;
mod domain;
mod imaging;
mod infrastructure;
mod platform;
mod tasks;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use infrastructure::{directories, logging, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = config::Cli::parse();
    let config = config::load_config(&cli)?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config, &paths)?;

    let (shutdown, _) = shutdown::Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());

    let app = app::ExterminatorApp::initialize(config, shutdown)?;
    app.run().await
}
