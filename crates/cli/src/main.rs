// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use spanwise_config::{ConfigurationSection, TelemetryConfig};

mod app_state;
mod commands;
mod handlers;
mod server;
mod shutdown;
mod telemetry;

fn main() -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<ExitCode> {
    let res = try_main().await;

    // Pending spans are flushed whether the command succeeded or not
    if let Err(err) = self::telemetry::shutdown().await {
        eprintln!("Failed to flush the pending spans: {err}");
    }

    res
}

async fn try_main() -> anyhow::Result<ExitCode> {
    // A missing .env file is fine, any other failure is logged once logging
    // is up
    let dotenv = dotenvy::dotenv()
        .map(Some)
        .or_else(|e| if e.not_found() { Ok(None) } else { Err(e) });

    let opts = self::commands::Options::parse();
    let figment = opts.figment();

    let telemetry_config = TelemetryConfig::extract(&figment)
        .map_err(anyhow::Error::from_boxed)
        .context("Failed to load telemetry config")?;

    let telemetry = self::telemetry::setup(&telemetry_config.tracing)
        .context("failed to setup OpenTelemetry")?;
    let _guard = self::telemetry::init_logging(telemetry)?;

    // The exporter is built before the subscriber exists
    if let Some(error) = telemetry.exporter_error() {
        tracing::warn!(
            error = error as &dyn std::error::Error,
            "Spans are not exported"
        );
    }

    match dotenv {
        Ok(Some(path)) => tracing::info!(?path, "Loaded environment variables from .env file"),
        Ok(None) => {}
        Err(e) => tracing::warn!(?e, "Failed to load .env file"),
    }

    tracing::trace!(?opts, "Running command");
    opts.run(&figment).await
}
