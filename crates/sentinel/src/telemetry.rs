//! Tracing subscriber setup with optional OpenTelemetry export

use crate::config::{LoggingSettings, TelemetrySettings};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub type TelemetryError = Box<dyn std::error::Error + Send + Sync>;

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

fn tracer_provider(settings: &TelemetrySettings) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.otlp_endpoint.as_str())
        .build()?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build())
}

/// Install the global subscriber.
///
/// Must run inside the Tokio runtime when telemetry is enabled. Keep the
/// returned guard alive for the lifetime of the process.
pub fn init_tracing(
    logging: &LoggingSettings,
    telemetry: &TelemetrySettings,
) -> Result<Option<TelemetryGuard>, TelemetryError> {
    if !telemetry.enabled {
        if logging.is_json() {
            common::logging::init_json_with_level(logging.level());
        } else {
            common::logging::init_with_level(logging.level());
        }
        tracing::info!("Tracing initialized without OpenTelemetry");
        return Ok(None);
    }

    let provider = tracer_provider(telemetry)?;
    let tracer = provider.tracer(telemetry.service_name.clone());
    opentelemetry::global::set_tracer_provider(provider);

    let fmt_layer = if logging.is_json() {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(logging.level())))
        .try_init()?;

    tracing::info!(
        service_name = %telemetry.service_name,
        otlp_endpoint = %telemetry.otlp_endpoint,
        "Tracing initialized with OpenTelemetry integration"
    );

    Ok(Some(TelemetryGuard))
}
