// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! An in-memory document store
//!
//! It behaves like a tiny document database: documents are JSON objects
//! keyed by their `_id`, filters match on field equality and updates use the
//! `$set` operator. Every operation goes through a pooled "connection" and
//! fires the [`CommandMonitor`] and [`PoolMonitor`] hooks, like a networked
//! store would.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use async_trait::async_trait;
use opentelemetry::Context;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    Collection, Database, DeleteResult, Document, InsertOneResult, UpdateResult,
    monitor::{
        CommandFailedEvent, CommandMonitor, CommandStartedEvent, CommandSucceededEvent,
        PoolEvent, PoolEventKind, PoolMonitor,
    },
};

const ADDRESS: &str = "memory";
const ID_FIELD: &str = "_id";
const SET_OPERATOR: &str = "$set";

/// Errors of the in-memory store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("E11000 duplicate key error collection: {collection} index: _id_ dup key: {id}")]
    DuplicateKey { collection: String, id: String },

    #[error("invalid update: {0}")]
    InvalidUpdate(&'static str),
}

/// The hooks fired by a [`MemoryDatabase`]
#[derive(Clone, Default)]
pub struct Monitors {
    pub command: Option<Arc<dyn CommandMonitor>>,
    pub pool: Option<Arc<dyn PoolMonitor>>,
}

impl std::fmt::Debug for Monitors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitors")
            .field("command", &self.command.is_some())
            .field("pool", &self.pool.is_some())
            .finish()
    }
}

impl Monitors {
    #[must_use]
    pub fn with_command_monitor(mut self, monitor: impl CommandMonitor + 'static) -> Self {
        self.command = Some(Arc::new(monitor));
        self
    }

    #[must_use]
    pub fn with_pool_monitor(mut self, monitor: impl PoolMonitor + 'static) -> Self {
        self.pool = Some(Arc::new(monitor));
        self
    }
}

#[derive(Debug, Default)]
struct Shared {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    idle: Mutex<Vec<u64>>,
    next_connection_id: AtomicU64,
    next_request_id: AtomicU64,
    monitors: Monitors,
}

impl Shared {
    fn pool_event(&self, kind: PoolEventKind, connection_id: u64) {
        if let Some(monitor) = &self.monitors.pool {
            monitor.event(&PoolEvent {
                kind,
                address: ADDRESS.to_owned(),
                connection_id,
            });
        }
    }

    async fn check_out(&self) -> u64 {
        let idle = self.idle.lock().await.pop();
        let connection_id = if let Some(connection_id) = idle {
            connection_id
        } else {
            let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1;
            self.pool_event(PoolEventKind::ConnectionCreated, connection_id);
            connection_id
        };

        self.pool_event(PoolEventKind::ConnectionCheckedOut, connection_id);
        connection_id
    }

    async fn check_in(&self, connection_id: u64) {
        self.idle.lock().await.push(connection_id);
        self.pool_event(PoolEventKind::ConnectionCheckedIn, connection_id);
    }
}

/// A database held in memory
///
/// Cloning it is cheap, and the clones share the same documents.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    name: Arc<str>,
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_monitors(name, Monitors::default())
    }

    #[must_use]
    pub fn with_monitors(name: &str, monitors: Monitors) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                monitors,
                ..Shared::default()
            }),
        }
    }
}

impl Database for MemoryDatabase {
    type Collection = MemoryCollection;

    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Self::Collection {
        MemoryCollection {
            database: self.clone(),
            name: name.into(),
        }
    }
}

/// A collection of a [`MemoryDatabase`]
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    database: MemoryDatabase,
    name: Arc<str>,
}

impl MemoryCollection {
    /// Run a command against the documents of this collection, firing the
    /// pool and command hooks around it
    async fn run<T: Send>(
        &self,
        cx: &Context,
        command_name: &'static str,
        command: Document,
        f: impl FnOnce(&mut Vec<Document>) -> Result<T, MemoryError> + Send,
    ) -> Result<T, MemoryError> {
        let shared = &self.database.shared;
        let connection = shared.check_out().await;
        let connection_id = format!("{ADDRESS}:{connection}");
        let request_id = shared.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(monitor) = &shared.monitors.command {
            monitor.started(
                cx,
                &CommandStartedEvent {
                    command_name,
                    command: &command,
                    database_name: &self.database.name,
                    request_id,
                    connection_id: &connection_id,
                },
            );
        }

        let start = Instant::now();
        let result = {
            let mut collections = shared.collections.lock().await;
            let documents = collections.entry(self.name.to_string()).or_default();
            f(documents)
        };
        let duration = start.elapsed();

        if let Some(monitor) = &shared.monitors.command {
            match &result {
                Ok(_) => monitor.succeeded(
                    cx,
                    &CommandSucceededEvent {
                        command_name,
                        request_id,
                        connection_id: &connection_id,
                        duration,
                    },
                ),
                Err(failure) => monitor.failed(
                    cx,
                    &CommandFailedEvent {
                        command_name,
                        request_id,
                        connection_id: &connection_id,
                        duration,
                        failure,
                    },
                ),
            }
        }

        shared.check_in(connection).await;
        result
    }

    fn command(&self, command_name: &str, body: Value) -> Document {
        let mut command = Document::new();
        command.insert(command_name.to_owned(), Value::String(self.name.to_string()));
        if let Value::Object(body) = body {
            command.extend(body);
        }
        command
    }
}

fn filter_matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

fn set_fields(update: &Document) -> Result<&Document, MemoryError> {
    if update.len() != 1 {
        return Err(MemoryError::InvalidUpdate(
            "update must only contain a $set operator",
        ));
    }

    let Some(Value::Object(fields)) = update.get(SET_OPERATOR) else {
        return Err(MemoryError::InvalidUpdate(
            "update must only contain a $set operator",
        ));
    };

    if fields.contains_key(ID_FIELD) {
        return Err(MemoryError::InvalidUpdate("the _id field is immutable"));
    }

    Ok(fields)
}

#[async_trait]
impl Collection for MemoryCollection {
    type Error = MemoryError;

    const STORE: &'static str = "Memory";
    const SYSTEM: &'static str = "memory";

    fn database_name(&self) -> &str {
        &self.database.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(
        &self,
        cx: &Context,
        mut document: Document,
    ) -> Result<InsertOneResult, Self::Error> {
        let id = document
            .entry(ID_FIELD)
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()))
            .clone();

        let command = self.command("insert", json!({ "documents": [&document] }));
        let collection = self.name.to_string();

        self.run(cx, "insert", command, move |documents| {
            if documents.iter().any(|d| d.get(ID_FIELD) == Some(&id)) {
                return Err(MemoryError::DuplicateKey {
                    collection,
                    id: id_to_string(&id),
                });
            }

            documents.push(document);
            Ok(InsertOneResult { inserted_id: id })
        })
        .await
    }

    async fn find_one(
        &self,
        cx: &Context,
        filter: Document,
    ) -> Result<Option<Document>, Self::Error> {
        let command = self.command("find", json!({ "filter": &filter, "limit": 1 }));

        self.run(cx, "find", command, |documents| {
            Ok(documents.iter().find(|d| filter_matches(d, &filter)).cloned())
        })
        .await
    }

    async fn find(&self, cx: &Context, filter: Document) -> Result<Vec<Document>, Self::Error> {
        let command = self.command("find", json!({ "filter": &filter }));

        self.run(cx, "find", command, |documents| {
            Ok(documents
                .iter()
                .filter(|d| filter_matches(d, &filter))
                .cloned()
                .collect())
        })
        .await
    }

    async fn update_one(
        &self,
        cx: &Context,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, Self::Error> {
        let command = self.command(
            "update",
            json!({ "updates": [{ "q": &filter, "u": &update }] }),
        );

        self.run(cx, "update", command, |documents| {
            let fields = set_fields(&update)?;
            let Some(document) = documents.iter_mut().find(|d| filter_matches(d, &filter)) else {
                return Ok(UpdateResult {
                    matched_count: 0,
                    modified_count: 0,
                });
            };

            let mut modified = false;
            for (key, value) in fields {
                if document.get(key) != Some(value) {
                    document.insert(key.clone(), value.clone());
                    modified = true;
                }
            }

            Ok(UpdateResult {
                matched_count: 1,
                modified_count: u64::from(modified),
            })
        })
        .await
    }

    async fn delete_one(&self, cx: &Context, filter: Document) -> Result<DeleteResult, Self::Error> {
        let command = self.command("delete", json!({ "deletes": [{ "q": &filter, "limit": 1 }] }));

        self.run(cx, "delete", command, |documents| {
            let deleted_count = match documents.iter().position(|d| filter_matches(d, &filter)) {
                Some(index) => {
                    documents.remove(index);
                    1
                }
                None => 0,
            };

            Ok(DeleteResult { deleted_count })
        })
        .await
    }
}
