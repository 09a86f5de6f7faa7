//! Tracing pipeline initialisation for drivelink.
//!
//! Call [`init_tracing`] once at process startup, before the Tokio runtime
//! is built, and hold the returned guard until exit.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `DRIVELINK_LOG_FORMAT=json` | Emit newline-delimited JSON logs instead of the compact format. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set, every `tick` span is exported over OTLP/HTTP. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = drivelink_runtime::telemetry::init_tracing("drivelink");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Interpret a `DRIVELINK_LOG_FORMAT` value; anything but `json` is compact.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber: env filter, console formatter and, when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OpenTelemetry layer.
///
/// A second call is harmless: the already-installed subscriber stays in
/// place and the new provider (if any) is only flushed on guard drop.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::parse(std::env::var("DRIVELINK_LOG_FORMAT").ok().as_deref());

    let provider = build_provider(service_name);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("drivelink")));
    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()
    {
        eprintln!("[drivelink] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

/// RAII guard that shuts down the OTel [`SdkTracerProvider`] on drop,
/// flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[drivelink] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

/// `None` when the endpoint variable is absent or the exporter fails to
/// build (reported on stderr; console logging still works).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[drivelink] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Simple exporter: no runtime exists yet when this runs.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
