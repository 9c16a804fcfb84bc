// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use opentelemetry_sdk::trace::SdkTracer;
use spanwise_context::Deployment;
use tower::Layer;

use super::service::RequestTraceService;

/// A [`Layer`] opening a server span for every inbound HTTP request.
///
/// The span continues the trace found in the request headers, if any. A
/// [`spanwise_context::TraceContext`] holding it is published in the request
/// extensions, along with the [`crate::RequestId`].
#[derive(Clone, Debug)]
pub struct RequestTraceLayer {
    tracer: SdkTracer,
    deployment: Arc<Deployment>,
}

impl RequestTraceLayer {
    /// Create a new [`RequestTraceLayer`], using the given tracer to start
    /// spans
    #[must_use]
    pub fn new(tracer: SdkTracer) -> Self {
        Self {
            tracer,
            deployment: Arc::new(Deployment::default()),
        }
    }

    /// Set the deployment metadata attached to every request span
    #[must_use]
    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = Arc::new(deployment);
        self
    }
}

impl<S> Layer<S> for RequestTraceLayer {
    type Service = RequestTraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTraceService::new(inner, self.tracer.clone(), self.deployment.clone())
    }
}
