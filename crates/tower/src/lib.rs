// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Tower layer tracing inbound HTTP requests
//!
//! [`RequestTraceLayer`] opens one server span per request, continuing the
//! trace propagated by the client if there is one, and hands a
//! [`spanwise_context::TraceContext`] to the handlers through the request
//! extensions.

#![allow(clippy::module_name_repetitions)]

mod handler_error;
mod request_id;
mod trace_context;
mod tracing;

pub use self::{
    handler_error::HandlerError,
    request_id::{RequestId, X_REQUEST_ID},
    trace_context::{extract_context, inject_context},
    tracing::*,
};
