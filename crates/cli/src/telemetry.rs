// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{io::IsTerminal, sync::OnceLock, time::Duration};

use anyhow::Context;
use spanwise_config::TracingConfig;
use spanwise_telemetry::{Telemetry, TelemetryError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

static SHUTDOWN_TIMEOUT: OnceLock<Duration> = OnceLock::new();

/// Build the tracer provider described by the configuration and install it
/// for the whole process
pub fn setup(config: &TracingConfig) -> Result<&'static Telemetry, TelemetryError> {
    let telemetry = Telemetry::builder(config).build().install()?;
    let _ = SHUTDOWN_TIMEOUT.set(config.shutdown_timeout());
    Ok(telemetry)
}

/// Install the global subscriber: human-readable logs on stderr, filtered
/// with `RUST_LOG`, and `tracing` spans forwarded to the tracer.
///
/// Logs are written from a background thread, until the returned guard is
/// dropped.
pub fn init_logging(telemetry: &Telemetry) -> anyhow::Result<WorkerGuard> {
    let output = std::io::stderr();
    let with_ansi = output.is_terminal();
    let (writer, guard) = tracing_appender::non_blocking(output);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(with_ansi);

    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("could not setup logging filter")?;

    let otel_layer = tracing_opentelemetry::layer()
        .with_tracer(telemetry.tracer().clone())
        .with_tracked_inactivity(false)
        .with_filter(LevelFilter::INFO);

    Registry::default()
        .with(otel_layer)
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .context("could not initialize logging")?;

    Ok(guard)
}

/// Flush the pending spans, if telemetry was set up
pub async fn shutdown() -> Result<(), TelemetryError> {
    let Some(telemetry) = spanwise_telemetry::installed() else {
        return Ok(());
    };

    let timeout = SHUTDOWN_TIMEOUT
        .get()
        .copied()
        .unwrap_or(Duration::from_secs(5));

    telemetry.shutdown(timeout).await
}
