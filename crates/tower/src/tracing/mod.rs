// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

mod future;
mod layer;
mod make_span;
mod service;

pub use self::{future::RequestTraceFuture, layer::RequestTraceLayer, service::RequestTraceService};
