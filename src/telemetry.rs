#![allow(unused_imports)] // some used only for telemetry feature
use opentelemetry::trace::{TraceId, TracerProvider};
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

use crate::{Error, Result};

/// Set to `json` for one JSON object per log line
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";

/// Collector the OTLP exporter sends spans to
pub const OTLP_ENDPOINT_VAR: &str = "OPENTELEMETRY_ENDPOINT_URL";

///  Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> TraceId {
    use opentelemetry::trace::TraceContextExt as _; // Context -> trace::Span
    use tracing_opentelemetry::OpenTelemetrySpanExt as _; // tracing::Span -> Context

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

#[cfg(feature = "telemetry")]
async fn init_tracer() -> Result<opentelemetry::sdk::trace::Tracer> {
    let otlp_endpoint = std::env::var(OTLP_ENDPOINT_VAR)
        .map_err(|_| Error::ConfigError(format!("{OTLP_ENDPOINT_VAR} must point at a collector")))?;

    let channel = tonic::transport::Channel::from_shared(otlp_endpoint)
        .map_err(|e| Error::ConfigError(format!("invalid {OTLP_ENDPOINT_VAR}: {e}")))?
        .connect()
        .await
        .map_err(|e| Error::ConfigError(format!("cannot reach trace collector: {e}")))?;

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_channel(channel))
        .with_trace_config(opentelemetry::sdk::trace::config().with_resource(
            opentelemetry::sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                "tenant-console",
            )]),
        ))
        .install_batch(opentelemetry::runtime::Tokio)
        .map_err(|e| Error::ConfigError(format!("cannot install trace pipeline: {e}")))
}

/// Whether `LOG_FORMAT` asks for JSON lines
fn json_logs(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
}

/// Initialize tracing
pub async fn init() -> Result<()> {
    // Setup tracing layers
    #[cfg(feature = "telemetry")]
    let telemetry = tracing_opentelemetry::layer().with_tracer(init_tracer().await?);

    let (compact, json) = if json_logs(std::env::var(LOG_FORMAT_VAR).ok().as_deref()) {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer().compact()), None)
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::ConfigError(format!("invalid log filter: {e}")))?;

    // Decide on layers
    #[cfg(feature = "telemetry")]
    let collector = Registry::default()
        .with(telemetry)
        .with(compact)
        .with(json)
        .with(env_filter);
    #[cfg(not(feature = "telemetry"))]
    let collector = Registry::default().with(compact).with(json).with(env_filter);

    // Initialize tracing
    tracing::subscriber::set_global_default(collector)
        .map_err(|e| Error::ConfigError(format!("tracing already initialized: {e}")))
}
