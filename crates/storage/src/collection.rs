// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use async_trait::async_trait;
use opentelemetry::Context;
use serde_json::Value;

/// A JSON document, as stored in a [`Collection`]
pub type Document = serde_json::Map<String, Value>;

/// The operations a [`Collection`] exposes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    InsertOne,
    FindOne,
    Find,
    UpdateOne,
    DeleteOne,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsertOne => "InsertOne",
            Self::FindOne => "FindOne",
            Self::Find => "Find",
            Self::UpdateOne => "UpdateOne",
            Self::DeleteOne => "DeleteOne",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of [`Collection::insert_one`]
#[derive(Clone, Debug, PartialEq)]
pub struct InsertOneResult {
    /// The `_id` of the inserted document
    pub inserted_id: Value,
}

/// The outcome of [`Collection::update_one`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateResult {
    /// How many documents matched the filter
    pub matched_count: u64,

    /// How many documents were actually changed
    pub modified_count: u64,
}

/// The outcome of [`Collection::delete_one`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteResult {
    /// How many documents were deleted
    pub deleted_count: u64,
}

/// A collection of documents in a store.
///
/// Every operation gets the [`Context`] of the operation in progress, which
/// the store hands to its command hooks.
#[async_trait]
pub trait Collection: Send + Sync {
    /// The error type returned by the collection
    type Error: std::error::Error + Send + Sync + 'static;

    /// Name of the store, prefixing the name of the spans
    const STORE: &'static str;

    /// Identifier of the store, as reported in the `db.system` attribute
    const SYSTEM: &'static str;

    /// Name of the database this collection lives in
    fn database_name(&self) -> &str;

    /// Name of the collection
    fn name(&self) -> &str;

    /// Insert a new document.
    ///
    /// An `_id` is generated if the document does not have one.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the underlying store fails, or if a
    /// document with the same `_id` already exists
    async fn insert_one(
        &self,
        cx: &Context,
        document: Document,
    ) -> Result<InsertOneResult, Self::Error>;

    /// Find the first document matching the filter
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the underlying store fails
    async fn find_one(&self, cx: &Context, filter: Document)
    -> Result<Option<Document>, Self::Error>;

    /// Find all the documents matching the filter
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the underlying store fails
    async fn find(&self, cx: &Context, filter: Document) -> Result<Vec<Document>, Self::Error>;

    /// Update the first document matching the filter
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the underlying store fails, or if the
    /// update is invalid
    async fn update_one(
        &self,
        cx: &Context,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, Self::Error>;

    /// Delete the first document matching the filter
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the underlying store fails
    async fn delete_one(&self, cx: &Context, filter: Document) -> Result<DeleteResult, Self::Error>;
}

/// A database, handing out [`Collection`]s
pub trait Database: Send + Sync {
    /// The type of collection in this database
    type Collection: Collection;

    /// Name of the database
    fn name(&self) -> &str;

    /// Get a handle on a collection, creating it if needed
    fn collection(&self, name: &str) -> Self::Collection;
}
