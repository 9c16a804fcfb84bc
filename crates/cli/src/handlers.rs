// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spanwise_context::{TraceContext, TraceData, in_span, trace_error, trace_success};
use spanwise_storage::{Document, memory::MemoryError};
use spanwise_tower::HandlerError;
use thiserror::Error;

use crate::app_state::AppState;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid request body")]
    InvalidBody(#[from] JsonRejection),

    #[error(transparent)]
    Storage(#[from] MemoryError),

    #[error("malformed user document")]
    Malformed(#[from] serde_json::Error),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Storage(MemoryError::DuplicateKey { .. }) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, HandlerError::new(self), body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    name: String,
    email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub async fn index() -> &'static str {
    "Hello, World!"
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(cx): Extension<TraceContext>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), RouteError> {
    in_span(&cx, "CreateUser", |cx| async move {
        let result = insert_user(&state, &cx, payload).await;

        match &result {
            Ok(user) => {
                trace_success(&cx.span());
                TraceData {
                    user_id: user.id.clone(),
                    action: Some("CreateUser".to_owned()),
                    resource: Some("users".to_owned()),
                    ..TraceData::default()
                }
                .apply(&cx.span());
            }
            Err(error) => trace_error(&cx.span(), error),
        }

        Ok((StatusCode::CREATED, Json(result?)))
    })
    .await
}

async fn insert_user(
    state: &AppState,
    cx: &TraceContext,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<User, RouteError> {
    let Json(new_user) = payload?;

    let now = Utc::now();
    let mut user = User {
        id: None,
        name: new_user.name,
        email: new_user.email,
        created_at: now,
        updated_at: now,
    };

    let document: Document = serde_json::from_value(serde_json::to_value(&user)?)?;
    let inserted = state.users.insert_one(cx, document).await?;
    user.id = match inserted.inserted_id {
        Value::String(id) => Some(id),
        other => Some(other.to_string()),
    };

    Ok(user)
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(cx): Extension<TraceContext>,
) -> Result<Json<Vec<User>>, RouteError> {
    let documents = state.users.find(&cx, Document::new()).await?;

    let users = documents
        .into_iter()
        .map(|document| serde_json::from_value(Value::Object(document)))
        .collect::<Result<Vec<User>, _>>()?;

    Ok(Json(users))
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}
