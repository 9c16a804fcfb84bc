// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use http::{Request, Response};
use http_body::Body;
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer};
use opentelemetry_sdk::trace::SdkTracer;
use spanwise_context::{Deployment, SpanGuard, TraceContext, TraceData};
use tokio_util::sync::CancellationToken;
use tower::Service;

use super::{future::RequestTraceFuture, make_span};
use crate::{RequestId, trace_context::extract_context};

#[derive(Clone, Debug)]
pub struct RequestTraceService<S> {
    inner: S,
    tracer: SdkTracer,
    deployment: Arc<Deployment>,
}

impl<S> RequestTraceService<S> {
    /// Create a new [`RequestTraceService`].
    #[must_use]
    pub fn new(inner: S, tracer: SdkTracer, deployment: Arc<Deployment>) -> Self {
        Self {
            inner,
            tracer,
            deployment,
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestTraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: std::error::Error + 'static,
    ReqBody: Body,
    ResBody: Body,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = RequestTraceFuture<S::Future>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let parent = extract_context(request.headers());
        let request_id = RequestId::from_headers(request.headers());
        let name = make_span::span_name(&request);

        let span = self
            .tracer
            .span_builder(name.clone())
            .with_kind(SpanKind::Server)
            .with_attributes(make_span::request_attributes(&request, &request_id))
            .start_with_context(&self.tracer, &parent);
        let context = parent.with_span(span);
        let guard = SpanGuard::new(context.clone());

        let mut data = TraceData::for_deployment(&self.deployment);
        data.request_id = Some(request_id.to_string());
        data.action = Some(make_span::http_method(&request).to_owned());
        data.resource = Some(name.into_owned());
        data.client_ip = make_span::client_ip(&request);
        data.user_agent = make_span::http_user_agent(&request).map(ToOwned::to_owned);
        data.request_size = make_span::request_content_length(&request);
        data.apply(&context.span());

        let cancellation = CancellationToken::new();
        let trace_context = TraceContext::new(self.tracer.clone(), context.clone(), cancellation.clone());
        request.extensions_mut().insert(trace_context);
        request.extensions_mut().insert(request_id.clone());

        let inner = {
            let _attached = context.attach();
            self.inner.call(request)
        };

        RequestTraceFuture::new(inner, guard, data, request_id, cancellation.drop_guard())
    }
}
