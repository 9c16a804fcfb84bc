// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{error::Error, sync::Arc};

use axum::response::{IntoResponseParts, ResponseParts};

/// An error a handler failed with, attached to its response.
///
/// Handlers turning an error into a response can add this to the response
/// parts, so that the request span records the actual error. It does not
/// change what the client receives.
///
/// ```
/// use axum::{http::StatusCode, response::IntoResponse};
/// use spanwise_tower::HandlerError;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("user not found")]
/// struct NotFound;
///
/// impl IntoResponse for NotFound {
///     fn into_response(self) -> axum::response::Response {
///         (StatusCode::NOT_FOUND, HandlerError::new(self), "Not found").into_response()
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct HandlerError(Arc<dyn Error + Send + Sync + 'static>);

impl HandlerError {
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }
}

impl From<Arc<dyn Error + Send + Sync + 'static>> for HandlerError {
    fn from(error: Arc<dyn Error + Send + Sync + 'static>) -> Self {
        Self(error)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for HandlerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

impl IntoResponseParts for HandlerError {
    type Error = std::convert::Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}
