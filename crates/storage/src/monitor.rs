// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Hooks fired by a store around the commands it runs

use std::time::Duration;

use opentelemetry::{Context, Key, KeyValue, trace::TraceContextExt};

use crate::Document;

const DB_COMMAND_NAME: Key = Key::from_static_str("db.command.name");
const DB_STATEMENT: Key = Key::from_static_str("db.statement");
const DB_CONNECTION_ID: Key = Key::from_static_str("db.connection_id");
const DB_DURATION_MS: Key = Key::from_static_str("db.duration_ms");
const DB_SLOW: Key = Key::from_static_str("db.slow");

/// A command is about to be sent
#[derive(Debug)]
pub struct CommandStartedEvent<'a> {
    pub command_name: &'a str,
    pub command: &'a Document,
    pub database_name: &'a str,
    pub request_id: u64,
    pub connection_id: &'a str,
}

/// A command succeeded
#[derive(Debug)]
pub struct CommandSucceededEvent<'a> {
    pub command_name: &'a str,
    pub request_id: u64,
    pub connection_id: &'a str,
    pub duration: Duration,
}

/// A command failed
#[derive(Debug)]
pub struct CommandFailedEvent<'a> {
    pub command_name: &'a str,
    pub request_id: u64,
    pub connection_id: &'a str,
    pub duration: Duration,
    pub failure: &'a (dyn std::error::Error + Send + Sync + 'static),
}

/// Hooks fired around every command a store sends.
///
/// Each hook gets the [`Context`] the operation was started with.
pub trait CommandMonitor: Send + Sync {
    fn started(&self, cx: &Context, event: &CommandStartedEvent<'_>);
    fn succeeded(&self, cx: &Context, event: &CommandSucceededEvent<'_>);
    fn failed(&self, cx: &Context, event: &CommandFailedEvent<'_>);
}

/// A [`CommandMonitor`] attaching the command details to the span active in
/// the context.
///
/// It never sets the span status nor ends the span, those are left to
/// whoever owns the span.
#[derive(Debug, Clone, Copy)]
pub struct SpanCommandMonitor {
    slow_threshold: Duration,
}

impl SpanCommandMonitor {
    /// Create a monitor flagging the commands which take longer than the
    /// given threshold
    #[must_use]
    pub fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }

    fn record_duration(&self, cx: &Context, command_name: &str, duration: Duration) {
        let span = cx.span();
        let duration_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        span.set_attribute(KeyValue::new(DB_DURATION_MS, duration_ms));

        if duration >= self.slow_threshold {
            span.set_attribute(KeyValue::new(DB_SLOW, true));
            tracing::warn!(
                db.command.name = command_name,
                db.duration_ms = duration_ms,
                threshold = ?self.slow_threshold,
                "Slow database command"
            );
        }
    }
}

impl CommandMonitor for SpanCommandMonitor {
    fn started(&self, cx: &Context, event: &CommandStartedEvent<'_>) {
        let statement = serde_json::to_string(event.command).unwrap_or_default();
        cx.span().set_attributes([
            KeyValue::new(DB_COMMAND_NAME, event.command_name.to_owned()),
            KeyValue::new(DB_STATEMENT, statement),
            KeyValue::new(DB_CONNECTION_ID, event.connection_id.to_owned()),
        ]);
    }

    fn succeeded(&self, cx: &Context, event: &CommandSucceededEvent<'_>) {
        self.record_duration(cx, event.command_name, event.duration);
    }

    fn failed(&self, cx: &Context, event: &CommandFailedEvent<'_>) {
        self.record_duration(cx, event.command_name, event.duration);
        cx.span().record_error(event.failure);
    }
}

/// What happened to a connection of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEventKind {
    ConnectionCreated,
    ConnectionCheckedOut,
    ConnectionCheckedIn,
}

/// An event of the connection pool of a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEvent {
    pub kind: PoolEventKind,
    pub address: String,
    pub connection_id: u64,
}

/// Hook fired on every connection pool event
pub trait PoolMonitor: Send + Sync {
    fn event(&self, event: &PoolEvent);
}

/// A [`PoolMonitor`] logging every event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPoolMonitor;

impl PoolMonitor for LogPoolMonitor {
    fn event(&self, event: &PoolEvent) {
        tracing::debug!(
            kind = ?event.kind,
            address = %event.address,
            connection_id = event.connection_id,
            "Database pool event"
        );
    }
}
