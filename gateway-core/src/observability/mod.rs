//! Logging and metrics setup for the gateway.

use clap::ValueEnum;
use metrics::{Unit, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{Error, ErrorDetails};

/// Directives used when `RUST_LOG` is not set.
pub const DEFAULT_GATEWAY_DIRECTIVES: &str = "warn,gateway=info,gateway_core=info";

pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const PROVIDER_INSTANCES_CREATED_TOTAL: &str = "gateway_provider_instances_created_total";

#[derive(Clone, Debug, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn build_filter(rust_log: Option<&str>) -> Result<EnvFilter, Error> {
    match rust_log {
        Some(directives) => EnvFilter::builder().parse(directives).map_err(|e| {
            Error::new(ErrorDetails::Observability {
                message: format!("Invalid `RUST_LOG` environment variable: {e}"),
            })
        }),
        None => EnvFilter::builder()
            .parse(DEFAULT_GATEWAY_DIRECTIVES)
            .map_err(|e| {
                Error::new(ErrorDetails::Observability {
                    message: format!("Failed to parse default log directives: {e}"),
                })
            }),
    }
}

/// Installs the global `tracing` subscriber.
///
/// If the `RUST_LOG` env var is set, it is used as the filter. Otherwise the gateway
/// logs at `info` and everything else at `warn`.
pub fn setup_observability(log_format: LogFormat) -> Result<(), Error> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(rust_log.as_deref())?;

    let log_layer = match log_format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(log_layer.with_filter(filter))
        .try_init()
        .map_err(|e| {
            Error::new(ErrorDetails::Observability {
                message: format!("Failed to install the tracing subscriber: {e}"),
            })
        })
}

/// Set up Prometheus metrics exporter
pub fn setup_metrics() -> Result<PrometheusHandle, Error> {
    let metrics_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        Error::new(ErrorDetails::Observability {
            message: format!("Failed to install Prometheus exporter: {e}"),
        })
    })?;

    describe_counter!(
        REQUESTS_TOTAL,
        Unit::Count,
        "Requests handled by the gateway, by endpoint",
    );

    describe_counter!(
        PROVIDER_INSTANCES_CREATED_TOTAL,
        Unit::Count,
        "Provider clients constructed, by provider",
    );

    Ok(metrics_handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(build_filter(None).is_ok());
        assert!(build_filter(Some("debug,gateway_core::providers=trace")).is_ok());
    }

    #[test]
    fn test_invalid_rust_log() {
        let err = build_filter(Some("gateway=loud")).unwrap_err();
        assert!(matches!(err.get_details(), ErrorDetails::Observability { .. }));
    }
}
