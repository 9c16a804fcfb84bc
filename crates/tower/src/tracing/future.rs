// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::task::ready;

use chrono::Utc;
use http::{Response, StatusCode};
use http_body::Body;
use opentelemetry::trace::TraceContextExt;
use pin_project_lite::pin_project;
use spanwise_context::{SpanGuard, TraceData};
use tokio_util::sync::DropGuard;

use super::make_span::response_attributes;
use crate::{HandlerError, RequestId, X_REQUEST_ID};

pin_project! {
    /// The future returned by [`super::RequestTraceService`].
    ///
    /// Dropping it ends the request span and cancels the request token, even
    /// if the inner future did not complete.
    pub struct RequestTraceFuture<F> {
        #[pin]
        inner: F,
        guard: SpanGuard,
        data: TraceData,
        request_id: RequestId,
        _cancellation: DropGuard,
    }
}

impl<F> RequestTraceFuture<F> {
    pub(crate) fn new(
        inner: F,
        guard: SpanGuard,
        data: TraceData,
        request_id: RequestId,
        cancellation: DropGuard,
    ) -> Self {
        Self {
            inner,
            guard,
            data,
            request_id,
            _cancellation: cancellation,
        }
    }
}

impl<F, B, E> Future for RequestTraceFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    E: std::error::Error + 'static,
{
    type Output = Result<Response<B>, E>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let this = self.project();

        // Poll the inner future with the request context attached, so that
        // anything relying on the current context sees the request span
        let _attached = this.guard.context().clone().attach();
        let mut result = ready!(this.inner.poll(cx));

        let span = this.guard.context().span();
        this.data.finish(Utc::now());

        match &mut result {
            Ok(response) => {
                let handler_error = response.extensions().get::<HandlerError>().cloned();

                this.data.status_code = Some(response.status());
                this.data.response_size = super::make_span::response_content_length(response);
                if let Some(error) = &handler_error {
                    this.data.set_error(error);
                }

                this.data.apply(&span);
                span.set_attributes(response_attributes(response));
                if let Some(error) = &handler_error {
                    span.record_error(error);
                }

                if let Some(value) = this.request_id.header_value() {
                    response.headers_mut().insert(X_REQUEST_ID.clone(), value);
                }
            }

            Err(error) => {
                this.data.status_code = Some(StatusCode::INTERNAL_SERVER_ERROR);
                this.data.set_error(&*error);
                this.data.apply(&span);
                span.record_error(&*error);
            }
        }

        span.end();

        std::task::Poll::Ready(result)
    }
}
