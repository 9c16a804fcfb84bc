// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use opentelemetry::{
    Key, KeyValue,
    trace::{SpanKind, Status, TraceContextExt, Tracer},
};
use opentelemetry_sdk::trace::SdkTracer;
use spanwise_context::{SpanGuard, TraceContext};

use crate::{
    Collection, Database, DeleteResult, Document, InsertOneResult, Operation, UpdateResult,
};

const DB_SYSTEM: Key = Key::from_static_str("db.system");
const DB_NAME: Key = Key::from_static_str("db.name");
const DB_COLLECTION: Key = Key::from_static_str("db.collection");
const DB_OPERATION: Key = Key::from_static_str("db.operation");

/// A [`Collection`] wrapper opening one span per operation.
///
/// Each span is named after the store and the operation, like
/// `Memory.InsertOne`, and is a child of the span in the [`TraceContext`]
/// given to the operation. Its status reflects the outcome of the operation.
#[derive(Debug, Clone)]
pub struct TracedCollection<C> {
    inner: C,
    tracer: SdkTracer,
}

impl<C: Collection> TracedCollection<C> {
    #[must_use]
    pub fn new(inner: C, tracer: SdkTracer) -> Self {
        Self { inner, tracer }
    }

    fn start(&self, parent: &TraceContext, operation: Operation) -> SpanGuard {
        let span = self
            .tracer
            .span_builder(format!("{}.{operation}", C::STORE))
            .with_kind(SpanKind::Client)
            .with_attributes([
                KeyValue::new(DB_SYSTEM, C::SYSTEM),
                KeyValue::new(DB_NAME, self.inner.database_name().to_owned()),
                KeyValue::new(DB_COLLECTION, self.inner.name().to_owned()),
                KeyValue::new(DB_OPERATION, operation.as_str()),
            ])
            .start_with_context(&self.tracer, parent.context());

        SpanGuard::new(parent.context().with_span(span))
    }

    /// Insert a new document, see [`Collection::insert_one`]
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying collection, unchanged
    pub async fn insert_one(
        &self,
        parent: &TraceContext,
        document: Document,
    ) -> Result<InsertOneResult, C::Error> {
        let guard = self.start(parent, Operation::InsertOne);
        let result = self.inner.insert_one(guard.context(), document).await;
        finish(&guard, &result);
        result
    }

    /// Find the first document matching the filter, see
    /// [`Collection::find_one`]
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying collection, unchanged
    pub async fn find_one(
        &self,
        parent: &TraceContext,
        filter: Document,
    ) -> Result<Option<Document>, C::Error> {
        let guard = self.start(parent, Operation::FindOne);
        let result = self.inner.find_one(guard.context(), filter).await;
        finish(&guard, &result);
        result
    }

    /// Find all the documents matching the filter, see [`Collection::find`]
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying collection, unchanged
    pub async fn find(
        &self,
        parent: &TraceContext,
        filter: Document,
    ) -> Result<Vec<Document>, C::Error> {
        let guard = self.start(parent, Operation::Find);
        let result = self.inner.find(guard.context(), filter).await;
        finish(&guard, &result);
        result
    }

    /// Update the first document matching the filter, see
    /// [`Collection::update_one`]
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying collection, unchanged
    pub async fn update_one(
        &self,
        parent: &TraceContext,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, C::Error> {
        let guard = self.start(parent, Operation::UpdateOne);
        let result = self.inner.update_one(guard.context(), filter, update).await;
        finish(&guard, &result);
        result
    }

    /// Delete the first document matching the filter, see
    /// [`Collection::delete_one`]
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying collection, unchanged
    pub async fn delete_one(
        &self,
        parent: &TraceContext,
        filter: Document,
    ) -> Result<DeleteResult, C::Error> {
        let guard = self.start(parent, Operation::DeleteOne);
        let result = self.inner.delete_one(guard.context(), filter).await;
        finish(&guard, &result);
        result
    }
}

/// Set the span status from the outcome of the operation, and end the span
fn finish<T, E: std::error::Error>(guard: &SpanGuard, result: &Result<T, E>) {
    let span = guard.context().span();

    match result {
        Ok(_) => span.set_status(Status::Ok),
        Err(error) => {
            span.record_error(error);
            span.set_status(Status::error(error.to_string()));
        }
    }

    span.end();
}

/// A [`Database`] wrapper handing out [`TracedCollection`]s
#[derive(Debug, Clone)]
pub struct TracedDatabase<D> {
    inner: D,
    tracer: SdkTracer,
}

impl<D: Database> TracedDatabase<D> {
    #[must_use]
    pub fn new(inner: D, tracer: SdkTracer) -> Self {
        Self { inner, tracer }
    }

    /// Get a traced handle on a collection
    #[must_use]
    pub fn collection(&self, name: &str) -> TracedCollection<D::Collection> {
        TracedCollection::new(self.inner.collection(name), self.tracer.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use opentelemetry::{Context, Value, trace::TracerProvider as _};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        SpanCommandMonitor,
        memory::{MemoryCollection, MemoryDatabase, Monitors},
    };

    struct Harness {
        exporter: InMemorySpanExporter,
        parent: TraceContext,
        users: TracedCollection<MemoryCollection>,
    }

    impl Harness {
        fn new(monitors: Monitors) -> Self {
            let exporter = InMemorySpanExporter::default();
            let provider = SdkTracerProvider::builder()
                .with_simple_exporter(exporter.clone())
                .build();
            let tracer = provider.tracer("test");

            let root = tracer.start("request");
            let parent = TraceContext::new(
                tracer.clone(),
                Context::new().with_span(root),
                CancellationToken::new(),
            );

            let database = TracedDatabase::new(
                MemoryDatabase::with_monitors("app", monitors),
                tracer,
            );
            let users = database.collection("users");

            Self {
                exporter,
                parent,
                users,
            }
        }

        fn spans(&self) -> Vec<SpanData> {
            self.exporter.get_finished_spans().unwrap()
        }
    }

    fn attribute(span: &SpanData, key: &str) -> Option<Value> {
        span.attributes
            .iter()
            .rev()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    fn doc(value: serde_json::Value) -> Document {
        let serde_json::Value::Object(document) = value else {
            panic!("not an object");
        };
        document
    }

    #[tokio::test]
    async fn test_success() {
        let harness = Harness::new(Monitors::default());

        harness
            .users
            .insert_one(&harness.parent, doc(json!({ "_id": "alice" })))
            .await
            .unwrap();

        let spans = harness.spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];

        assert_eq!(span.name, "Memory.InsertOne");
        assert_eq!(span.span_kind, SpanKind::Client);
        assert_eq!(
            span.parent_span_id,
            harness.parent.span().span_context().span_id()
        );
        assert_eq!(
            span.span_context.trace_id(),
            harness.parent.span().span_context().trace_id()
        );
        assert_eq!(span.status, Status::Ok);
        assert!(span.events.events.is_empty());

        assert_eq!(attribute(span, "db.system"), Some("memory".into()));
        assert_eq!(attribute(span, "db.name"), Some("app".into()));
        assert_eq!(attribute(span, "db.collection"), Some("users".into()));
        assert_eq!(attribute(span, "db.operation"), Some("InsertOne".into()));
    }

    #[tokio::test]
    async fn test_failure() {
        let harness = Harness::new(Monitors::default());

        harness
            .users
            .insert_one(&harness.parent, doc(json!({ "_id": "alice" })))
            .await
            .unwrap();
        let error = harness
            .users
            .insert_one(&harness.parent, doc(json!({ "_id": "alice" })))
            .await
            .unwrap_err();

        let spans = harness.spans();
        assert_eq!(spans.len(), 2);
        let span = &spans[1];

        assert_eq!(span.status, Status::error(error.to_string()));
        let exception = span
            .events
            .events
            .iter()
            .find(|event| event.name == "exception")
            .unwrap();
        assert!(exception.attributes.iter().any(|kv| {
            kv.key.as_str() == "exception.message"
                && kv.value == Value::from(error.to_string())
        }));
    }

    #[tokio::test]
    async fn test_every_operation_is_traced() {
        let harness = Harness::new(Monitors::default());
        let parent = &harness.parent;
        let users = &harness.users;

        users
            .insert_one(parent, doc(json!({ "_id": "alice", "age": 30 })))
            .await
            .unwrap();
        assert!(
            users
                .find_one(parent, doc(json!({ "_id": "alice" })))
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(users.find(parent, Document::new()).await.unwrap().len(), 1);
        users
            .update_one(
                parent,
                doc(json!({ "_id": "alice" })),
                doc(json!({ "$set": { "age": 31 } })),
            )
            .await
            .unwrap();
        users
            .delete_one(parent, doc(json!({ "_id": "alice" })))
            .await
            .unwrap();

        let names: Vec<_> = harness
            .spans()
            .into_iter()
            .map(|span| span.name.into_owned())
            .collect();
        assert_eq!(
            names,
            [
                "Memory.InsertOne",
                "Memory.FindOne",
                "Memory.Find",
                "Memory.UpdateOne",
                "Memory.DeleteOne",
            ]
        );
    }

    #[tokio::test]
    async fn test_command_monitor_enriches_operation_span() {
        let monitors =
            Monitors::default().with_command_monitor(SpanCommandMonitor::new(Duration::ZERO));
        let harness = Harness::new(monitors);

        harness
            .users
            .insert_one(&harness.parent, doc(json!({ "_id": "alice" })))
            .await
            .unwrap();
        harness
            .users
            .insert_one(&harness.parent, doc(json!({ "_id": "alice" })))
            .await
            .unwrap_err();

        // The hooks do not open spans of their own
        let spans = harness.spans();
        assert_eq!(spans.len(), 2);

        let ok = &spans[0];
        assert_eq!(ok.status, Status::Ok);
        assert_eq!(attribute(ok, "db.command.name"), Some("insert".into()));
        assert_eq!(attribute(ok, "db.slow"), Some(Value::Bool(true)));
        let statement = attribute(ok, "db.statement").unwrap().to_string();
        assert!(statement.contains(r#""insert":"users""#));

        // The failure hook records the error, the wrapper owns the status
        let failed = &spans[1];
        assert!(matches!(failed.status, Status::Error { .. }));
        let exceptions = failed
            .events
            .events
            .iter()
            .filter(|event| event.name == "exception")
            .count();
        assert_eq!(exceptions, 2);
    }
}
