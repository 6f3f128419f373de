use std::process::ExitCode;

use caseportal_lib::Configuration;
use tracing::{debug, error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "caseportal_lib=debug,caseportal=debug,tower_http=debug,warn".into()
            } else {
                "caseportal_lib=info,caseportal=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!("Case portal starting");

    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    let config = match Configuration::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = caseportal_lib::run(config).await {
        error!(error = %e, "Portal stopped with an error");
        return ExitCode::FAILURE;
    }

    info!("Case portal stopped");
    ExitCode::SUCCESS
}
