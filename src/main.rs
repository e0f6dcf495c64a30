//! ontap-metrocluster entry point
//!
//! Runs one command against one cluster and prints its JSON outcome.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use ontap_metrocluster::cli::{self, Cli, LogFormat};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let otel_enabled = match init_tracing(cli.logging.log_format) {
        Ok(enabled) => enabled,
        Err(e) => {
            eprintln!("tracing disabled: {e:#}");
            false
        }
    };

    info!("Starting ontap-metrocluster v{}", cli::VERSION);
    let result = cli::execute(&cli).await;

    // Flush any remaining traces
    if otel_enabled {
        if let Err(e) = ontap_metrocluster::telemetry::shutdown_telemetry().await {
            eprintln!("telemetry shutdown failed: {e}");
        }
    }

    match result {
        Ok(outcome) => match serde_json::to_string(&outcome) {
            Ok(rendered) => {
                println!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => report_failure(&format!("Failed to render outcome: {e}")),
        },
        Err(e) => {
            error!("{}", e);
            report_failure(&e.to_string())
        }
    }
}

/// Install the subscriber; returns whether OTLP export is active
fn init_tracing(format: LogFormat) -> anyhow::Result<bool> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    // stdout carries the JSON outcome, logs go to stderr
    let fmt_layer = match format {
        LogFormat::Text => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    // Only enable OTEL if an endpoint is provided
    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        let otel_layer = ontap_metrocluster::telemetry::init_telemetry(&registry)
            .context("failed to build OTLP exporter")?;
        registry
            .with(otel_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
        info!("OpenTelemetry tracing initialized");
    } else {
        registry
            .try_init()
            .context("failed to install tracing subscriber")?;
    }

    Ok(otel_enabled)
}

fn report_failure(msg: &str) -> ExitCode {
    println!("{}", cli::failure_document(msg));
    ExitCode::FAILURE
}
