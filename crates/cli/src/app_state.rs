// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use opentelemetry_sdk::trace::SdkTracer;
use spanwise_config::DatabaseConfig;
use spanwise_storage::{
    LogPoolMonitor, SpanCommandMonitor, TracedCollection, TracedDatabase,
    memory::{MemoryCollection, MemoryDatabase, Monitors},
};

const USERS_COLLECTION: &str = "users";

#[derive(Clone, Debug)]
pub struct AppState {
    pub users: TracedCollection<MemoryCollection>,
}

impl AppState {
    /// Set up the store described by the configuration, with its monitors
    pub fn new(config: &DatabaseConfig, tracer: SdkTracer) -> Self {
        let mut monitors = Monitors::default();

        if config.apm.command_monitor {
            monitors =
                monitors.with_command_monitor(SpanCommandMonitor::new(config.apm.slow_threshold()));
        }

        if config.apm.pool_monitor {
            monitors = monitors.with_pool_monitor(LogPoolMonitor);
        }

        let database = TracedDatabase::new(MemoryDatabase::with_monitors(&config.name, monitors), tracer);

        Self {
            users: database.collection(USERS_COLLECTION),
        }
    }
}
