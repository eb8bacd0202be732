use anyhow::Context;
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

// Based on https://github.com/LukeMathWalker/tracing-actix-web/blob/main/examples/opentelemetry/src/main.rs#L15
/// Installs the global subscriber: bunyan JSON logs on stdout and, when enabled,
/// spans exported in batches to a Jaeger agent
pub fn init_telemetry(service_name: &str, jaeger_enabled: bool) -> anyhow::Result<()> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let telemetry = if jaeger_enabled {
        #[allow(deprecated)]
        let tracer = opentelemetry_jaeger::new_agent_pipeline()
            .with_service_name(service_name)
            .install_batch(TokioCurrentThread)
            .context("Failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    // Tunable via `RUST_LOG` env variable
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new(service_name.into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(telemetry)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install `tracing` subscriber")
}
