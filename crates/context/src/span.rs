// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::borrow::Cow;

use opentelemetry::{
    Context,
    trace::{TraceContextExt, Tracer},
};

use crate::TraceContext;

/// A guard which ends the span active in a [`Context`] when dropped.
///
/// Ending a span twice is a no-op, so it is fine to end the span explicitly
/// while the guard is still alive.
#[derive(Debug)]
#[must_use = "the span is ended as soon as the guard is dropped"]
pub struct SpanGuard {
    context: Context,
}

impl SpanGuard {
    /// Guard the span active in the given context
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// The context holding the guarded span
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.context.span().end();
    }
}

fn start_child(parent: &TraceContext, name: Cow<'static, str>) -> TraceContext {
    let span = parent.tracer().start_with_context(name, parent.context());
    parent.child(parent.context().with_span(span))
}

/// Run an async unit of work in a new child span of `parent`.
///
/// The work gets a [`TraceContext`] holding the new span, which it can use to
/// enrich the span or to start nested spans. The span is ended when the work
/// finishes, whatever its outcome, and also if the work panics or the
/// returned future is dropped before completion.
///
/// The result of the work is returned as is. This does not set a status on
/// the span, this is left to the work itself, usually through
/// [`crate::TraceData::apply`], [`crate::trace_success`] or
/// [`crate::trace_error`].
///
/// # Errors
///
/// Returns the error returned by the work, unmodified
pub async fn in_span<F, Fut, T, E>(
    parent: &TraceContext,
    name: impl Into<Cow<'static, str>>,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(TraceContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let child = start_child(parent, name.into());
    let _guard = SpanGuard::new(child.context().clone());
    work(child).await
}

/// Synchronous version of [`in_span`]
///
/// # Errors
///
/// Returns the error returned by the work, unmodified
pub fn in_span_sync<F, T, E>(
    parent: &TraceContext,
    name: impl Into<Cow<'static, str>>,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(&TraceContext) -> Result<T, E>,
{
    let child = start_child(parent, name.into());
    let _guard = SpanGuard::new(child.context().clone());
    work(&child)
}
