use axum::extract::DefaultBodyLimit;
use clap::Parser;
use std::fmt::Display;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use gateway_core::config::Config;
use gateway_core::db::postgres::{PostgresConnectionInfo, manual_run_postgres_migrations};
use gateway_core::endpoints;
use gateway_core::endpoints::status::GATEWAY_VERSION;
use gateway_core::observability;
use gateway_core::secrets::EnvSecretStore;
use gateway_core::utils::gateway::AppStateData;

mod cli;
mod routes;

use cli::GatewayArgs;

#[tokio::main]
async fn main() {
    let args = GatewayArgs::parse();
    // Set up logs immediately, so that we can use `tracing`.
    observability::setup_observability(args.log_format).expect_pretty("Failed to set up logs");

    let config = match &args.config_file {
        Some(path) => Config::load_from_path(path).expect_pretty("Failed to load config"),
        None => {
            tracing::warn!(
                "No config file provided, so the default config will be used. Use `--config-file path/to/gateway.toml` to specify a config file."
            );
            Config::default()
        }
    };
    let postgres_url = config.postgres_url();

    if args.early_exit_commands.run_postgres_migrations {
        manual_run_postgres_migrations(postgres_url.as_deref())
            .await
            .expect_pretty("Failed to run PostgreSQL migrations");
        tracing::info!("PostgreSQL migrations completed successfully.");
        return;
    }

    tracing::info!("Starting Gateway {GATEWAY_VERSION}");

    let metrics_handle = observability::setup_metrics().expect_pretty("Failed to set up metrics");

    let postgres_connection_info = match &postgres_url {
        Some(url) => PostgresConnectionInfo::connect_lazy(url)
            .expect_pretty("Failed to set up PostgreSQL connection"),
        None => {
            tracing::warn!(
                "No PostgreSQL URL configured, so every model lookup will fail. Set `GATEWAY_POSTGRES_URL` or `[postgres].url`."
            );
            PostgresConnectionInfo::new_disabled()
        }
    };
    let postgres_enabled_pretty = match &postgres_connection_info {
        PostgresConnectionInfo::Enabled { .. } => "enabled",
        PostgresConnectionInfo::Disabled => "disabled",
    };

    let app_state =
        AppStateData::from_config(&config, postgres_connection_info, Arc::new(EnvSecretStore))
            .expect_pretty("Failed to initialize AppState");
    let model_count = app_state.catalog.models().count();

    let router = routes::build_api_routes(metrics_handle)
        .fallback(endpoints::fallback::handle_404)
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // increase the default body limit from 2MB to 100MB
        // We log failed requests messages at 'DEBUG', since we already have our own error-logging code
        .layer(TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)))
        .with_state(app_state);

    let bind_address = args.bind_address.unwrap_or(config.gateway.bind_address);

    let listener = match tokio::net::TcpListener::bind(bind_address).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            tracing::error!(
                "Failed to bind to socket address {bind_address}: {e}. Tip: Ensure no other process is using port {} or try a different port.",
                bind_address.port()
            );
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Failed to bind to socket address {bind_address}: {e}");
            std::process::exit(1);
        }
    };

    // This will give us the chosen port if the user specified a port of 0
    let actual_bind_address = listener
        .local_addr()
        .expect_pretty("Failed to get bind address from listener");

    tracing::info!("Gateway is listening on {actual_bind_address}");
    match &args.config_file {
        Some(path) => tracing::info!("├ Configuration: {}", path.display()),
        None => tracing::info!("├ Configuration: default"),
    }
    tracing::info!("├ Catalog: {model_count} models");
    tracing::info!("└ PostgreSQL: {postgres_enabled_pretty}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect_pretty("Failed to start server");
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect_pretty("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect_pretty("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(unix)]
    let hangup = async {
        signal::unix::signal(signal::unix::SignalKind::hangup())
            .expect_pretty("Failed to install SIGHUP handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        }
        () = hangup => {
            tracing::info!("Received SIGHUP signal");
        }
    };
}

/// We don't allow panic, expect, unwrap, or similar methods in the codebase,
/// except for the private `expect_pretty` method, which is to be used only in
/// main.rs during initialization.
///
/// `expect_pretty` logs an error message and exits with a status code of 1.
trait ExpectPretty<T> {
    fn expect_pretty(self, msg: &str) -> T;
}

impl<T, E: Display> ExpectPretty<T> for Result<T, E> {
    fn expect_pretty(self, msg: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("{msg}: {err}");
                std::process::exit(1);
            }
        }
    }
}
