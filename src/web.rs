#![cfg(not(tarpaulin_include))]

use batchsheet::app;
use batchsheet::config::ServerConfig;
use clap::Parser;

/// Main entry point for the batch server
///
/// Reads [`ServerConfig`] from flags and `BATCHSHEET_*` variables, sets up
/// logging (`RUST_LOG`, default `info`) and serves until Ctrl-C.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    app::run(config).await
}
