// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use axum::{
    Router,
    routing::{get, post},
};
use opentelemetry_sdk::trace::SdkTracer;
use spanwise_context::Deployment;
use spanwise_tower::RequestTraceLayer;

use crate::{app_state::AppState, handlers};

/// Build the application router, with every request traced
pub fn build_router(state: AppState, tracer: SdkTracer, deployment: Deployment) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/users",
            post(handlers::create_user).get(handlers::list_users),
        )
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(RequestTraceLayer::new(tracer).with_deployment(deployment))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header::CONTENT_TYPE},
    };
    use http_body_util::BodyExt;
    use opentelemetry::{
        Value,
        trace::{SpanId, Status, TracerProvider as _},
    };
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
    use spanwise_config::DatabaseConfig;
    use tower::ServiceExt;

    use super::*;

    struct Harness {
        exporter: InMemorySpanExporter,
        router: Router,
    }

    impl Harness {
        fn new() -> Self {
            let exporter = InMemorySpanExporter::default();
            let provider = SdkTracerProvider::builder()
                .with_simple_exporter(exporter.clone())
                .build();
            let tracer = provider.tracer("test");

            let state = AppState::new(&DatabaseConfig::default(), tracer.clone());
            let router = build_router(state, tracer, Deployment::default());

            Self { exporter, router }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = response.into_body().collect().await.unwrap().to_bytes();
            let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
            (status, body)
        }

        fn span(&self, name: &str) -> SpanData {
            self.exporter
                .get_finished_spans()
                .unwrap()
                .into_iter()
                .find(|span| span.name == name)
                .unwrap()
        }
    }

    fn attribute(span: &SpanData, key: &str) -> Option<Value> {
        span.attributes
            .iter()
            .rev()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    fn create_user(body: &str) -> Request<Body> {
        Request::post("/users")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_user_spans() {
        let harness = Harness::new();

        let (status, user) = harness
            .send(create_user(r#"{"name":"alice","email":"alice@example.com"}"#))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = user["_id"].as_str().unwrap().to_owned();

        let request = harness.span("/users");
        let handler = harness.span("CreateUser");
        let insert = harness.span("Memory.InsertOne");

        // One trace, nested request > handler > store operation
        assert_eq!(request.parent_span_id, SpanId::INVALID);
        assert_eq!(handler.parent_span_id, request.span_context.span_id());
        assert_eq!(insert.parent_span_id, handler.span_context.span_id());
        assert_eq!(
            insert.span_context.trace_id(),
            request.span_context.trace_id()
        );

        assert_eq!(attribute(&request, "http.method"), Some("POST".into()));
        assert_eq!(attribute(&request, "status.code"), Some(Value::I64(201)));

        assert_eq!(handler.status, Status::Ok);
        assert_eq!(attribute(&handler, "user.id"), Some(Value::from(id)));

        assert_eq!(insert.status, Status::Ok);
        assert_eq!(attribute(&insert, "db.command.name"), Some("insert".into()));
    }

    #[tokio::test]
    async fn test_invalid_body() {
        let harness = Harness::new();

        let (status, body) = harness.send(create_user("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid request body");

        let handler = harness.span("CreateUser");
        assert_eq!(handler.status, Status::error("invalid request body"));

        let request = harness.span("/users");
        assert_eq!(request.status, Status::error("invalid request body"));
        assert_eq!(attribute(&request, "status.code"), Some(Value::I64(400)));
    }

    #[tokio::test]
    async fn test_list_users() {
        let harness = Harness::new();

        harness
            .send(create_user(r#"{"name":"alice","email":"alice@example.com"}"#))
            .await;
        harness
            .send(create_user(r#"{"name":"bob","email":"bob@example.com"}"#))
            .await;

        let (status, users) = harness
            .send(Request::get("/users").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users.as_array().unwrap().len(), 2);
        assert_eq!(users[0]["name"], "alice");

        let find = harness.span("Memory.Find");
        assert_eq!(find.status, Status::Ok);
    }

    #[tokio::test]
    async fn test_index_and_fallback() {
        let harness = Harness::new();

        let (status, _) = harness
            .send(Request::get("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(harness.span("/").status, Status::Ok);

        let (status, _) = harness
            .send(Request::get("/nope").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let spans = harness.exporter.get_finished_spans().unwrap();
        let span = spans.last().unwrap();
        assert_eq!(span.name, "HTTP GET route not found");
        assert_eq!(attribute(span, "status.code"), Some(Value::I64(404)));
        assert_eq!(span.status, Status::error("Unknown error"));
    }
}
