//! OpenTelemetry initialization and utilities
//!
//! Exports spans over OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! Credentials and peer addresses are scrubbed before export.

use opentelemetry::trace::TraceResult;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{Config, Sampler, SpanProcessor};
use std::env;
use tracing_subscriber::{registry::LookupSpan, Layer};

pub const SERVICE_NAME: &str = "ontap-metrocluster";

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

const SCRUBBED_KEYS: [&str; 6] = [
    "password",
    "username",
    "http.auth",
    "net.peer.ip",
    "net.host.ip",
    "host.name",
];

/// A span processor that scrubs sensitive information from span attributes
#[derive(Debug)]
struct ScrubbingProcessor {
    inner: std::sync::Mutex<Box<dyn SpanProcessor + Send + Sync>>,
}

impl ScrubbingProcessor {
    fn new(inner: Box<dyn SpanProcessor + Send + Sync>) -> Self {
        ScrubbingProcessor {
            inner: std::sync::Mutex::new(inner),
        }
    }

    fn scrub_attributes(&self, attributes: &mut [KeyValue]) {
        for kv in attributes.iter_mut() {
            if SCRUBBED_KEYS.contains(&kv.key.as_str()) {
                kv.value = opentelemetry::Value::String("[REDACTED]".into());
            }
        }
    }
}

impl SpanProcessor for ScrubbingProcessor {
    fn on_start(&self, span: &mut opentelemetry_sdk::trace::Span, cx: &opentelemetry::Context) {
        if let Ok(inner) = self.inner.lock() {
            inner.on_start(span, cx);
        }
    }

    fn on_end(&self, mut span: SpanData) {
        self.scrub_attributes(&mut span.attributes);
        if let Ok(inner) = self.inner.lock() {
            inner.on_end(span);
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        match self.inner.lock() {
            Ok(inner) => inner.force_flush(),
            Err(_) => Ok(()),
        }
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        match self.inner.lock() {
            Ok(mut inner) => inner.shutdown(),
            Err(_) => Ok(()),
        }
    }
}

/// Build the OTLP export layer and install the global tracer provider
pub fn init_telemetry<S>(_subscriber: &S) -> TraceResult<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    global::set_text_map_propagator(TraceContextPropagator::new());

    let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());

    let resource = Resource::new(vec![
        KeyValue::new("service.name", SERVICE_NAME),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&otlp_endpoint)
        .build_span_exporter()?;

    let batch_processor =
        opentelemetry_sdk::trace::BatchSpanProcessor::builder(exporter, runtime::Tokio).build();

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_config(
            Config::default()
                .with_resource(resource)
                .with_sampler(Sampler::AlwaysOn),
        )
        .with_span_processor(ScrubbingProcessor::new(Box::new(batch_processor)))
        .build();

    let tracer = opentelemetry::trace::TracerProvider::tracer(&provider, SERVICE_NAME);
    global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// Flush and drop the global tracer provider.
///
/// The batch processor exports from a runtime task, so the blocking shutdown
/// runs on the blocking pool and leaves the runtime workers free to drain it.
pub async fn shutdown_telemetry() -> Result<(), tokio::task::JoinError> {
    tokio::task::spawn_blocking(global::shutdown_tracer_provider).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::trace::Span;

    #[derive(Debug)]
    struct NoopProcessor;

    impl SpanProcessor for NoopProcessor {
        fn on_start(&self, _span: &mut Span, _cx: &opentelemetry::Context) {}

        fn on_end(&self, _span: SpanData) {}

        fn force_flush(&self) -> TraceResult<()> {
            Ok(())
        }

        fn shutdown(&mut self) -> TraceResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_scrubbing_processor() {
        let processor = ScrubbingProcessor::new(Box::new(NoopProcessor));

        let mut attributes = vec![
            KeyValue::new("password", "netapp1!"),
            KeyValue::new("safe.key", "value"),
            KeyValue::new("net.peer.ip", "10.0.0.1"),
            KeyValue::new("username", "admin"),
        ];

        processor.scrub_attributes(&mut attributes);

        let redacted = opentelemetry::Value::String("[REDACTED]".into());
        assert_eq!(attributes[0].value, redacted);
        assert_eq!(
            attributes[1].value,
            opentelemetry::Value::String("value".into())
        );
        assert_eq!(attributes[2].value, redacted);
        assert_eq!(attributes[3].value, redacted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_returns_after_export_layer_is_installed() {
        use std::time::Duration;

        // shutdown waits on the batch task whether or not spans were recorded
        let registry = tracing_subscriber::registry();
        let _layer = init_telemetry(&registry).unwrap();

        let shutdown = tokio::time::timeout(Duration::from_secs(20), shutdown_telemetry()).await;
        assert!(matches!(shutdown, Ok(Ok(()))));
    }

    #[test]
    fn test_scrubbing_processor_flushes_inner() {
        let mut processor = ScrubbingProcessor::new(Box::new(NoopProcessor));
        assert!(processor.force_flush().is_ok());
        assert!(processor.shutdown().is_ok());
    }
}
