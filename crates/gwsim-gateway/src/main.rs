//! Gateway emulator entry point
//!
//! Run with:
//! ```bash
//! cargo run -p gwsim-gateway                 # configuration from the environment
//! cargo run -p gwsim-gateway -- gwsim.toml   # configuration file
//! ```

use gwsim_common::{try_init_tracing_with_config, AppResult, GatewayConfig, TracingConfig};
use gwsim_gateway::Server;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing
    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config) {
        error!(error = %e, code = e.error_code(), "Gateway failed");
        std::process::exit(1);
    }
}

fn load_config() -> AppResult<GatewayConfig> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::from_env()?,
    };
    Ok(config)
}

fn run(config: GatewayConfig) -> AppResult<()> {
    info!(
        name = %config.app.name,
        env = ?config.app.env,
        port = config.gateway.port,
        tls = config.tls_enabled(),
        agents = config.agents.count,
        "Starting gateway emulator"
    );

    let cancel = CancellationToken::new();
    let server = Server::start(config, cancel.clone())?;

    // Agents and the listener run on their own threads; this runtime only waits for Ctrl-C
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    });

    info!("Shutdown signal received");
    cancel.cancel();
    server.join()?;

    info!("Gateway stopped");
    Ok(())
}
