// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Request-scoped trace context
//!
//! A [`TraceContext`] bundles the tracer with the OpenTelemetry context of
//! the operation in progress and a cancellation token scoped to the request.
//! It is created once per inbound request by the HTTP middleware, and then
//! handed explicitly to anything which wants to create child spans, either
//! directly or through [`in_span`].

#![allow(clippy::module_name_repetitions)]

mod span;
mod trace_data;

use opentelemetry::{
    Context,
    trace::{SpanRef, TraceContextExt},
};
use opentelemetry_sdk::trace::SdkTracer;
use tokio_util::sync::CancellationToken;

pub use self::{
    span::{SpanGuard, in_span, in_span_sync},
    trace_data::{
        DEFAULT_ENVIRONMENT, DEFAULT_REGION, DEFAULT_SERVICE_NAME, DEFAULT_VERSION, Deployment,
        TraceData, UNKNOWN_ERROR_MESSAGE, trace_error, trace_success,
    },
};

/// The trace context of an operation, carried explicitly through the call
/// chain.
///
/// It is never mutated once built: deriving a context for a nested operation
/// with [`TraceContext::child`] creates a new value, leaving this one
/// untouched.
#[derive(Clone, Debug)]
pub struct TraceContext {
    tracer: SdkTracer,
    context: Context,
    cancellation: CancellationToken,
}

impl TraceContext {
    /// Create a new trace context
    #[must_use]
    pub fn new(tracer: SdkTracer, context: Context, cancellation: CancellationToken) -> Self {
        Self {
            tracer,
            context,
            cancellation,
        }
    }

    /// Derive a trace context for a nested operation, sharing the tracer and
    /// the cancellation token of this one
    #[must_use]
    pub fn child(&self, context: Context) -> Self {
        Self {
            tracer: self.tracer.clone(),
            context,
            cancellation: self.cancellation.clone(),
        }
    }

    /// The tracer used to start child spans
    #[must_use]
    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    /// The OpenTelemetry context, holding the active span
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The span active in this context
    ///
    /// If no span was ever attached, this is a non-recording span and all
    /// operations on it are no-ops.
    #[must_use]
    pub fn span(&self) -> SpanRef<'_> {
        self.context.span()
    }

    /// The token cancelled once the request this context belongs to is over
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the request this context belongs to was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{Tracer, TracerProvider as _};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    use super::*;

    #[test]
    fn child_shares_tracer_and_cancellation() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("test");

        let root = TraceContext::new(tracer.clone(), Context::new(), CancellationToken::new());
        assert!(!root.span().span_context().is_valid());

        let span = tracer.start_with_context("child", root.context());
        let child = root.child(root.context().with_span(span));
        assert!(child.span().span_context().is_valid());

        // The original context is left untouched
        assert!(!root.span().span_context().is_valid());

        root.cancellation_token().cancel();
        assert!(child.is_cancelled());
        assert!(root.is_cancelled());

        child.span().end();
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }
}
