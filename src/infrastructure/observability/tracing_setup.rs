//! OpenTelemetry distributed tracing setup

use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{CacheConfig, LogFormat, TracingExporter};

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Initialize logging plus optional OpenTelemetry span export.
///
/// Returns the tracer provider when the OTLP exporter was installed; hand
/// it to [`shutdown_tracing`] on shutdown to flush pending spans. With the
/// console exporter (or tracing disabled) spans only reach the log layer.
pub fn init_tracing(config: &CacheConfig) -> Option<TracerProvider> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let observability = &config.observability;
    let use_otlp = observability.enable_tracing
        && observability.tracing_exporter == TracingExporter::Otlp;

    let provider = if use_otlp {
        match init_otel_provider(config) {
            Ok(provider) => Some(provider),
            Err(e) => {
                eprintln!("Failed to initialize OpenTelemetry: {}. Tracing disabled.", e);
                None
            }
        }
    } else {
        None
    };

    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true);
            let telemetry_layer = provider.as_ref().map(|provider| {
                tracing_opentelemetry::layer().with_tracer(provider.tracer("semantic-cache"))
            });

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .with(telemetry_layer)
                .init();
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE);
            let telemetry_layer = provider.as_ref().map(|provider| {
                tracing_opentelemetry::layer().with_tracer(provider.tracer("semantic-cache"))
            });

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .with(telemetry_layer)
                .init();
        }
    }

    if provider.is_some() {
        tracing::info!(
            "Tracing initialized with OpenTelemetry export to {}",
            observability
                .tracing_endpoint
                .as_deref()
                .unwrap_or(DEFAULT_OTLP_ENDPOINT)
        );
    } else {
        tracing::info!("Tracing initialized (OpenTelemetry export disabled)");
    }

    provider
}

fn init_otel_provider(
    config: &CacheConfig,
) -> Result<TracerProvider, opentelemetry::trace::TraceError> {
    let observability = &config.observability;
    let endpoint = observability
        .tracing_endpoint
        .as_deref()
        .unwrap_or(DEFAULT_OTLP_ENDPOINT);

    let resource = Resource::new(vec![KeyValue::new(
        "service.name",
        observability.service_name.clone(),
    )]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = TracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .with_batch_exporter(exporter, runtime::Tokio)
        .build();

    Ok(provider)
}

/// Flush pending spans and shut the provider down.
pub fn shutdown_tracing(provider: TracerProvider) {
    if let Err(e) = provider.shutdown() {
        eprintln!("Tracing shutdown error: {}", e);
    }
}
