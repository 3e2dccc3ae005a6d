//! OTLP span export, layered under the same filter as console logging.

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::collections::HashMap;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};
use url::Url;

const TRACER_NAME: &str = "evm-indexer";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP exporter: {0}")]
    Exporter(#[from] ExporterBuildError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("HTTP client thread panicked")]
    ClientThread,

    #[error("Failed to install global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Where and as whom spans are exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpSettings {
    pub endpoint: Url,
    pub api_key: String,
    pub service_name: String,
    pub environment: String,
}

/// Shuts the tracer provider down, flushing queued spans, when dropped.
pub struct TelemetryGuard {
    provider: SdkTracerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("Failed to flush spans on shutdown: {e}");
        }
    }
}

/// Installs console output plus span export as the global subscriber.
pub fn setup_telemetry(
    settings: &OtlpSettings,
    filter: EnvFilter,
) -> Result<TelemetryGuard, TelemetryError> {
    let provider = tracer_provider(settings)?;
    let spans = tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME));

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(spans);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(TelemetryGuard { provider })
}

fn tracer_provider(settings: &OtlpSettings) -> Result<SdkTracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_http_client(blocking_client()?)
        .with_endpoint(settings.endpoint.as_str())
        .with_headers(HashMap::from([(
            "authorization".to_string(),
            settings.api_key.clone(),
        )]))
        .build()?;

    let resource = Resource::builder()
        .with_service_name(settings.service_name.clone())
        .with_attributes([
            KeyValue::new("deployment.environment", settings.environment.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

/// reqwest's blocking client panics when constructed on an async worker.
fn blocking_client() -> Result<reqwest::blocking::Client, TelemetryError> {
    std::thread::spawn(|| reqwest::blocking::Client::builder().build())
        .join()
        .map_err(|_| TelemetryError::ClientThread)?
        .map_err(TelemetryError::from)
}
