#![cfg(not(tarpaulin_include))]

use credit_desk::app;
use credit_desk::config::AppConfig;

/// Main entry point for the credit desk web server
///
/// Reads the configuration named by `CREDIT_DESK_CONFIG` (or
/// `credit-desk.json`), an optional first argument overriding the bind
/// address, and serves the JSON API until interrupted.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = AppConfig::from_env()?;
    if let Some(bind) = std::env::args().nth(1) {
        config.bind = bind;
    }

    app::run(config).await
}
