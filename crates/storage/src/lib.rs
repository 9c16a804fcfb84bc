// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Interactions with the document store
//!
//! This crate defines the [`Collection`] and [`Database`] traits that a
//! document store implements, and an in-memory implementation of them in
//! [`memory`].
//!
//! Operations are traced by wrapping a collection in a [`TracedCollection`]:
//! each operation then runs in its own client span, child of the
//! [`TraceContext`] given to the operation, and its status reflects whether
//! the operation succeeded.
//!
//! Stores also fire hooks around the commands they send, described in
//! [`monitor`]. The [`SpanCommandMonitor`] attaches the command details to
//! the span of the operation in progress, without ever touching its status.
//!
//! ```
//! # use opentelemetry::trace::TracerProvider as _;
//! # use opentelemetry_sdk::trace::SdkTracerProvider;
//! # use spanwise_context::TraceContext;
//! # use tokio_util::sync::CancellationToken;
//! use spanwise_storage::{Database, TracedDatabase, memory::MemoryDatabase};
//!
//! # #[tokio::main] async fn main() {
//! # let tracer = SdkTracerProvider::builder().build().tracer("doc");
//! # let cx = TraceContext::new(tracer.clone(), opentelemetry::Context::new(), CancellationToken::new());
//! let database = TracedDatabase::new(MemoryDatabase::new("app"), tracer);
//! let users = database.collection("users");
//!
//! let mut user = spanwise_storage::Document::new();
//! user.insert("name".to_owned(), "alice".into());
//! users.insert_one(&cx, user).await.unwrap();
//! # }
//! ```
//!
//! [`TraceContext`]: spanwise_context::TraceContext

#![deny(clippy::future_not_send)]

mod collection;
pub mod memory;
pub mod monitor;
mod traced;

pub use self::{
    collection::{
        Collection, Database, DeleteResult, Document, InsertOneResult, Operation, UpdateResult,
    },
    monitor::{CommandMonitor, LogPoolMonitor, PoolMonitor, SpanCommandMonitor},
    traced::{TracedCollection, TracedDatabase},
};
