//! Logging and distributed tracing setup
//!
//! Console output always goes through `tracing-subscriber` (plain or JSON).
//! When an OTLP endpoint is configured, spans are also exported through
//! OpenTelemetry so a request's `agent_run` span and its nested `llm_call` /
//! `code_execution` spans show up as one trace.
//!
//! ```text
//! skillbench → fmt layer (stdout)
//!            → OTLP (gRPC) → collector → trace backend   (optional)
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info,skillbench=debug";

/// Logging options resolved from the CLI
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// OTLP collector endpoint; spans are only exported when set
    pub otlp_endpoint: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Initialize the global subscriber
///
/// # Example
/// ```ignore
/// init_tracing("skillbench", &TracingConfig::default())?;
/// ```
pub fn init_tracing(
    service_name: &str,
    config: &TracingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otel_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()?;

    tracing::info!(
        service = service_name,
        otlp = config.otlp_endpoint.as_deref().unwrap_or("disabled"),
        "Tracing initialized"
    );

    Ok(())
}

/// Flush pending spans to the collector
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
    tracing::info!("Tracing shutdown complete");
}
