//! Binary entry point: reads settings from the environment, starts the
//! generator and runs until interrupted.

use load_shaper::shaping::{Dispatcher, GeneratorSettings, HttpSender};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

#[tokio::main]
async fn main() {
    // .env is optional; absence is fine.
    dotenvy::dotenv().ok();

    tracing_fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = GeneratorSettings::from_env();

    let sender = match HttpSender::new(&settings) {
        Ok(sender) => sender,
        Err(err) => {
            error!(error = %err, "cannot build HTTP sender");
            std::process::exit(1);
        }
    };

    let handle = Dispatcher::new(settings, sender).spawn();

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutting down; in-flight requests are abandoned");
    handle.shutdown().await;
}
