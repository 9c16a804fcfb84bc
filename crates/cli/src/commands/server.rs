// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{net::SocketAddr, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use figment::Figment;
use spanwise_config::{ConfigurationSection, RootConfig};
use tracing::{info, info_span};

use crate::{app_state::AppState, server::build_router, shutdown::ShutdownSignal};

#[derive(Parser, Debug, Default)]
pub(super) struct Options {}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let span = info_span!("cli.run.init").entered();
        let config = RootConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;
        let shutdown = ShutdownSignal::new()?;

        info!(version = env!("CARGO_PKG_VERSION"), "Starting up");

        let telemetry =
            spanwise_telemetry::installed().context("telemetry was not set up")?;
        let deployment = spanwise_telemetry::deployment(&config.telemetry.tracing);

        let state = AppState::new(&config.database, telemetry.tracer().clone());
        let router = build_router(state, telemetry.tracer().clone(), deployment);

        let listener = tokio::net::TcpListener::bind(config.http.listen)
            .await
            .with_context(|| format!("could not bind to {}", config.http.listen))?;

        info!(address = %config.http.listen, "Listening");
        drop(span);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.wait())
        .await
        .context("server failed")?;

        info!("Server stopped");

        Ok(ExitCode::SUCCESS)
    }
}
