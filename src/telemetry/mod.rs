//! Tracing and OpenTelemetry initialization.
//!
//! Logs always go to stderr. A run can mirror them, without colour, into
//! a log file. With an OTLP endpoint configured, spans, metrics and log
//! records are also exported over gRPC.

pub mod genai;
pub mod metrics;
pub mod task;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::error::{Error, Result};

pub struct TelemetryConfig {
    /// OTLP gRPC endpoint, e.g. `http://localhost:4317`.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Plain-text copy of everything written to stderr.
    pub log_file: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_name: "synthq".to_string(),
            log_file: None,
            default_level: "info".to_string(),
        }
    }
}

struct OtlpProviders {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

/// Keeps exporters alive; shutting them down on drop flushes pending data.
///
/// Hold it until the process is about to exit.
pub struct TelemetryGuard {
    otlp: Option<OtlpProviders>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(otlp) = self.otlp.take() {
            let _ = otlp.logger.shutdown();
            let _ = otlp.meter.shutdown();
            let _ = otlp.tracer.shutdown();
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails when the log file cannot be created, an exporter cannot be
/// built, or a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));
    let log_file = match &config.log_file {
        Some(path) => Some(Arc::new(File::create(path)?)),
        None => None,
    };

    let Some(endpoint) = config.endpoint else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(log_file.map(|file| fmt::layer().with_ansi(false).with_writer(file)))
            .try_init()
            .map_err(subscriber_error)?;
        return Ok(TelemetryGuard { otlp: None });
    };

    let otlp = otlp_providers(&endpoint, config.service_name)?;
    opentelemetry::global::set_meter_provider(otlp.meter.clone());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .with(log_file.map(|file| fmt::layer().with_ansi(false).with_writer(file)))
        .with(tracing_opentelemetry::layer().with_tracer(otlp.tracer.tracer("synthq")))
        .with(opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&otlp.logger))
        .try_init()
        .map_err(subscriber_error)?;

    tracing::info!(%endpoint, "otlp export enabled");
    Ok(TelemetryGuard { otlp: Some(otlp) })
}

fn otlp_providers(endpoint: &str, service_name: String) -> Result<OtlpProviders> {
    use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig as _};

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(service_name)
        .build();
    let spans = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(exporter_error("span"))?;
    let metrics = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(exporter_error("metric"))?;
    let logs = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(exporter_error("log"))?;

    Ok(OtlpProviders {
        tracer: SdkTracerProvider::builder()
            .with_batch_exporter(spans)
            .with_resource(resource.clone())
            .build(),
        meter: SdkMeterProvider::builder()
            .with_periodic_exporter(metrics)
            .with_resource(resource.clone())
            .build(),
        logger: SdkLoggerProvider::builder()
            .with_batch_exporter(logs)
            .with_resource(resource)
            .build(),
    })
}

fn exporter_error<E: std::fmt::Display>(signal: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::Other(format!("cannot build OTLP {signal} exporter: {e}"))
}

fn subscriber_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::Other(format!("cannot install tracing subscriber: {e}"))
}
