// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use chrono::{DateTime, SecondsFormat, Utc};
use http::StatusCode;
use opentelemetry::{
    Key, KeyValue,
    trace::{SpanRef, Status},
};

/// Environment used when none is configured
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Version used when none is configured
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Service name used when none is configured
pub const DEFAULT_SERVICE_NAME: &str = "default";

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "local";

/// Status message for errors which did not carry any error message
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

const SUCCESS_MESSAGE: &str = "Success";

const USER_ID: Key = Key::from_static_str("user.id");
const REQUEST_ID: Key = Key::from_static_str("request.id");
const SERVICE_NAME: Key = Key::from_static_str("service.name");
const ENVIRONMENT: Key = Key::from_static_str("environment");
const VERSION: Key = Key::from_static_str("version");
const REGION: Key = Key::from_static_str("region");
const ACTION: Key = Key::from_static_str("action");
const RESOURCE: Key = Key::from_static_str("resource");
const STATUS_CODE: Key = Key::from_static_str("status.code");
const STATUS_MESSAGE: Key = Key::from_static_str("status.message");
const CLIENT_IP: Key = Key::from_static_str("client.ip");
const USER_AGENT: Key = Key::from_static_str("user.agent");
const REQUEST_SIZE: Key = Key::from_static_str("request.size");
const RESPONSE_SIZE: Key = Key::from_static_str("response.size");
const DURATION_MS: Key = Key::from_static_str("duration.ms");
const START_TIME: Key = Key::from_static_str("start_time");
const END_TIME: Key = Key::from_static_str("end_time");
const ERROR_MESSAGE: Key = Key::from_static_str("error.message");

/// Where the service is deployed, attached to every [`TraceData`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// The name of the service
    pub service_name: String,

    /// The environment, like `production` or `staging`
    pub environment: String,

    /// The version of the service
    pub version: String,

    /// The region the service runs in
    pub region: String,
}

impl Default for Deployment {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            environment: DEFAULT_ENVIRONMENT.to_owned(),
            version: DEFAULT_VERSION.to_owned(),
            region: DEFAULT_REGION.to_owned(),
        }
    }
}

/// Structured metadata about an operation, projected onto a span with
/// [`TraceData::apply`].
///
/// Every field is optional, and fields which are unset or empty are not
/// emitted. The record is meant to be filled progressively as the operation
/// goes, and applied again to the same span each time it changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceData {
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub service_name: Option<String>,
    pub environment: Option<String>,
    pub version: Option<String>,
    pub region: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub status_code: Option<StatusCode>,

    /// The message of the error the operation failed with
    pub error: Option<String>,

    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_size: Option<u64>,
    pub response_size: Option<u64>,
    pub duration: Option<std::time::Duration>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

fn push_str(attributes: &mut Vec<KeyValue>, key: Key, value: Option<&String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        attributes.push(KeyValue::new(key, value.clone()));
    }
}

fn push_size(attributes: &mut Vec<KeyValue>, key: Key, value: Option<u64>) {
    if let Some(value) = value.filter(|v| *v != 0) {
        attributes.push(KeyValue::new(key, i64::try_from(value).unwrap_or(i64::MAX)));
    }
}

fn push_time(attributes: &mut Vec<KeyValue>, key: Key, value: Option<DateTime<Utc>>) {
    if let Some(value) = value {
        attributes.push(KeyValue::new(
            key,
            value.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
}

impl TraceData {
    /// Create a record for an operation starting now, with the default
    /// [`Deployment`]
    #[must_use]
    pub fn new() -> Self {
        Self::for_deployment(&Deployment::default())
    }

    /// Create a record for an operation starting now, with the given
    /// [`Deployment`]
    #[must_use]
    pub fn for_deployment(deployment: &Deployment) -> Self {
        Self {
            service_name: Some(deployment.service_name.clone()),
            environment: Some(deployment.environment.clone()),
            version: Some(deployment.version.clone()),
            region: Some(deployment.region.clone()),
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Attach an error to the record
    pub fn set_error(&mut self, error: &dyn std::error::Error) {
        self.error = Some(error.to_string());
    }

    /// Mark the operation as finished at the given time, computing its
    /// duration if the start time is known
    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        if let Some(start) = self.start_time {
            self.duration = (now - start).to_std().ok();
        }
    }

    /// The status this record classifies the operation as, if any.
    ///
    /// - a `200 OK` status code is a success;
    /// - any other status code is an error;
    /// - without a status code, an operation with an error attached is still
    ///   an error;
    /// - without a status code nor an error, the operation is not
    ///   classified.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        match (self.status_code, self.error.as_deref()) {
            (Some(StatusCode::OK), _) => Some(Status::Ok),
            (Some(_), None) => Some(Status::error(UNKNOWN_ERROR_MESSAGE)),
            (_, Some(message)) => Some(Status::error(message.to_owned())),
            (None, None) => None,
        }
    }

    /// Build the list of attributes this record projects onto a span
    #[must_use]
    pub fn attributes(&self) -> Vec<KeyValue> {
        let mut attributes = Vec::with_capacity(20);

        push_str(&mut attributes, USER_ID, self.user_id.as_ref());
        push_str(&mut attributes, REQUEST_ID, self.request_id.as_ref());
        push_str(&mut attributes, SERVICE_NAME, self.service_name.as_ref());
        push_str(&mut attributes, ENVIRONMENT, self.environment.as_ref());
        push_str(&mut attributes, VERSION, self.version.as_ref());
        push_str(&mut attributes, REGION, self.region.as_ref());
        push_str(&mut attributes, ACTION, self.action.as_ref());
        push_str(&mut attributes, RESOURCE, self.resource.as_ref());

        if let Some(status_code) = self.status_code {
            attributes.push(KeyValue::new(
                STATUS_CODE,
                i64::from(status_code.as_u16()),
            ));
        }

        push_str(&mut attributes, CLIENT_IP, self.client_ip.as_ref());
        push_str(&mut attributes, USER_AGENT, self.user_agent.as_ref());
        push_size(&mut attributes, REQUEST_SIZE, self.request_size);
        push_size(&mut attributes, RESPONSE_SIZE, self.response_size);

        if let Some(duration) = self.duration.filter(|d| !d.is_zero()) {
            attributes.push(KeyValue::new(
                DURATION_MS,
                duration.as_secs_f64() * 1000.0,
            ));
        }

        push_time(&mut attributes, START_TIME, self.start_time);
        push_time(&mut attributes, END_TIME, self.end_time);
        push_str(&mut attributes, ERROR_MESSAGE, self.error.as_ref());

        // The OK status can't carry a description, so the message is also
        // kept as an attribute
        match self.status() {
            Some(Status::Ok) => {
                attributes.push(KeyValue::new(STATUS_MESSAGE, SUCCESS_MESSAGE));
            }
            Some(Status::Error { description }) => {
                attributes.push(KeyValue::new(STATUS_MESSAGE, description.into_owned()));
            }
            Some(Status::Unset) | None => {}
        }

        attributes
    }

    /// Project this record onto the given span.
    ///
    /// This sets the attributes in one call, and the span status if the
    /// record classifies the operation. Attributes set by a previous call are
    /// kept. A key present in both calls is appended again rather than
    /// replaced, and exporters keep the last value.
    pub fn apply(&self, span: &SpanRef<'_>) {
        if let Some(status) = self.status() {
            span.set_status(status);
        }

        span.set_attributes(self.attributes());
    }
}

/// Mark the operation in the given span as failed with the given error.
///
/// This records the error on the span and sets its status, on top of
/// applying a minimal [`TraceData`] with a `400 Bad Request` status code.
pub fn trace_error(span: &SpanRef<'_>, error: &dyn std::error::Error) {
    let mut data = TraceData {
        status_code: Some(StatusCode::BAD_REQUEST),
        end_time: Some(Utc::now()),
        ..TraceData::default()
    };
    data.set_error(error);
    data.apply(span);

    span.record_error(error);
    span.set_status(Status::error(error.to_string()));
}

/// Mark the operation in the given span as successful.
///
/// This applies a minimal [`TraceData`] with a `200 OK` status code and sets
/// the span status.
pub fn trace_success(span: &SpanRef<'_>) {
    let data = TraceData {
        status_code: Some(StatusCode::OK),
        end_time: Some(Utc::now()),
        ..TraceData::default()
    };
    data.apply(span);

    span.set_status(Status::Ok);
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use chrono::TimeZone;
    use opentelemetry::{
        Context, Value,
        trace::{TraceContextExt, Tracer, TracerProvider as _},
    };
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("the database is on fire")]
    struct FireError;

    struct Harness {
        exporter: InMemorySpanExporter,
        tracer: opentelemetry_sdk::trace::SdkTracer,
    }

    impl Harness {
        fn new() -> Self {
            let exporter = InMemorySpanExporter::default();
            let provider = SdkTracerProvider::builder()
                .with_simple_exporter(exporter.clone())
                .build();
            let tracer = provider.tracer("test");
            Self { exporter, tracer }
        }

        /// Run the closure against a fresh span and return the finished span
        fn span(&self, f: impl FnOnce(&SpanRef<'_>)) -> SpanData {
            self.exporter.reset();
            let cx = Context::new().with_span(self.tracer.start("test"));
            f(&cx.span());
            cx.span().end();
            let mut spans = self.exporter.get_finished_spans().unwrap();
            assert_eq!(spans.len(), 1);
            spans.remove(0)
        }
    }

    /// Collect the attributes, the last value winning for duplicated keys
    fn attributes(span: &SpanData) -> HashMap<String, Value> {
        span.attributes
            .iter()
            .map(|kv| (kv.key.to_string(), kv.value.clone()))
            .collect()
    }

    fn record(status_code: Option<StatusCode>) -> TraceData {
        TraceData {
            request_id: Some("req-1".to_owned()),
            status_code,
            start_time: Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()),
            ..TraceData::default()
        }
    }

    #[test]
    fn test_defaults() {
        let data = TraceData::new();
        assert_eq!(data.environment.as_deref(), Some(DEFAULT_ENVIRONMENT));
        assert_eq!(data.version.as_deref(), Some(DEFAULT_VERSION));
        assert_eq!(data.service_name.as_deref(), Some(DEFAULT_SERVICE_NAME));
        assert_eq!(data.region.as_deref(), Some(DEFAULT_REGION));
        assert!(data.start_time.is_some());
        assert!(data.status_code.is_none());
        assert!(data.status().is_none());
    }

    #[test]
    fn test_success_classification() {
        let harness = Harness::new();
        let span = harness.span(|span| record(Some(StatusCode::OK)).apply(span));

        assert_eq!(span.status, Status::Ok);
        let attributes = attributes(&span);
        assert_eq!(attributes["status.code"], Value::I64(200));
        assert_eq!(attributes["status.message"], Value::from("Success"));
    }

    #[test]
    fn test_error_classification() {
        let harness = Harness::new();

        for code in [
            StatusCode::CREATED,
            StatusCode::NO_CONTENT,
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            let span = harness.span(|span| record(Some(code)).apply(span));
            assert_eq!(span.status, Status::error(UNKNOWN_ERROR_MESSAGE), "{code}");
            assert_eq!(
                attributes(&span)["status.code"],
                Value::I64(code.as_u16().into())
            );

            let span = harness.span(|span| {
                let mut data = record(Some(code));
                data.set_error(&FireError);
                data.apply(span);
            });
            assert_eq!(span.status, Status::error("the database is on fire"), "{code}");
            assert_eq!(
                attributes(&span)["error.message"],
                Value::from("the database is on fire")
            );
        }
    }

    #[test]
    fn test_unset_status_code_is_not_classified() {
        let harness = Harness::new();
        let span = harness.span(|span| {
            span.set_status(Status::error("previous"));
            record(None).apply(span);
        });

        // The previous status is left untouched
        assert_eq!(span.status, Status::error("previous"));
        let attributes = attributes(&span);
        assert!(!attributes.contains_key("status.code"));
        assert!(!attributes.contains_key("status.message"));
    }

    #[test]
    fn test_error_without_status_code_is_an_error() {
        let harness = Harness::new();
        let span = harness.span(|span| {
            let mut data = record(None);
            data.set_error(&FireError);
            data.apply(span);
        });

        assert_eq!(span.status, Status::error("the database is on fire"));
        assert!(!attributes(&span).contains_key("status.code"));
    }

    #[test]
    fn test_empty_fields_are_not_emitted() {
        let data = TraceData {
            user_id: Some(String::new()),
            request_id: Some("req-1".to_owned()),
            request_size: Some(0),
            response_size: Some(12),
            duration: Some(Duration::ZERO),
            ..TraceData::default()
        };

        let keys: Vec<String> = data
            .attributes()
            .into_iter()
            .map(|kv| kv.key.to_string())
            .collect();
        assert_eq!(keys, ["request.id", "response.size"]);
    }

    #[test]
    fn test_timestamps_and_duration() {
        let mut data = record(None);
        let start = data.start_time.unwrap();
        data.finish(start + chrono::Duration::milliseconds(1500));

        let attributes: HashMap<String, Value> = data
            .attributes()
            .into_iter()
            .map(|kv| (kv.key.to_string(), kv.value))
            .collect();
        assert_eq!(
            attributes["start_time"],
            Value::from("2025-01-02T03:04:05Z")
        );
        assert_eq!(attributes["end_time"], Value::from("2025-01-02T03:04:06Z"));
        assert_eq!(attributes["duration.ms"], Value::F64(1500.0));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let harness = Harness::new();
        let mut data = record(Some(StatusCode::NOT_FOUND));
        data.user_id = Some("alice".to_owned());

        let once = harness.span(|span| data.apply(span));
        let twice = harness.span(|span| {
            data.apply(span);
            data.apply(span);
        });

        // The span keeps every entry, each key twice, with the same values
        assert_eq!(twice.attributes.len(), 2 * once.attributes.len());
        let (first, second) = twice.attributes.split_at(once.attributes.len());
        assert_eq!(first, second);
        assert_eq!(first, once.attributes.as_slice());

        assert_eq!(attributes(&once), attributes(&twice));
        assert_eq!(once.status, twice.status);
    }

    #[test]
    fn test_progressive_enrichment() {
        let harness = Harness::new();
        let span = harness.span(|span| {
            let mut data = record(None);
            data.action = Some("GET".to_owned());
            data.apply(span);

            // Later on, only the outcome is known
            let outcome = TraceData {
                status_code: Some(StatusCode::OK),
                response_size: Some(42),
                ..TraceData::default()
            };
            outcome.apply(span);
        });

        let attributes = attributes(&span);
        // Attributes from the first call are still there
        assert_eq!(attributes["action"], Value::from("GET"));
        assert_eq!(attributes["request.id"], Value::from("req-1"));
        // And the new ones were added
        assert_eq!(attributes["response.size"], Value::I64(42));
        assert_eq!(span.status, Status::Ok);
    }

    #[test]
    fn test_trace_error() {
        let harness = Harness::new();
        let span = harness.span(|span| {
            // A partial record applied earlier does not prevent the terminal status
            record(None).apply(span);
            trace_error(span, &FireError);
        });

        assert_eq!(span.status, Status::error("the database is on fire"));
        let attributes = attributes(&span);
        assert_eq!(attributes["status.code"], Value::I64(400));
        assert_eq!(
            attributes["error.message"],
            Value::from("the database is on fire")
        );
        assert!(attributes.contains_key("end_time"));

        let exception = span
            .events
            .events
            .iter()
            .find(|event| event.name == "exception")
            .expect("the error should be recorded");
        assert!(exception.attributes.iter().any(|kv| {
            kv.key.as_str() == "exception.message"
                && kv.value == Value::from("the database is on fire")
        }));
    }

    #[test]
    fn test_trace_success() {
        let harness = Harness::new();
        let span = harness.span(trace_success);

        assert_eq!(span.status, Status::Ok);
        let attributes = attributes(&span);
        assert_eq!(attributes["status.code"], Value::I64(200));
        assert!(attributes.contains_key("end_time"));
        assert!(span.events.events.is_empty());
    }
}
