// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::collections::HashMap;

use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithHttpConfig, WithTonicConfig};
use spanwise_config::TracingConfig;
use tonic::{
    metadata::{MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};

use crate::TelemetryError;

/// Collector address used when none is configured
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:5081";

/// Stream name sent to the collector when none is configured
pub const DEFAULT_STREAM_NAME: &str = "default";

fn base_url(config: &TracingConfig) -> String {
    let endpoint = config
        .endpoint
        .as_deref()
        .filter(|endpoint| !endpoint.is_empty())
        .unwrap_or(DEFAULT_ENDPOINT);

    if endpoint.contains("://") {
        return endpoint.trim_end_matches('/').to_owned();
    }

    let scheme = if config.secure { "https" } else { "http" };
    format!("{scheme}://{endpoint}")
}

/// The full URL spans are posted to by the HTTP exporter
pub(crate) fn http_endpoint(config: &TracingConfig) -> String {
    format!("{}{}", base_url(config), config.url_path)
}

/// The headers sent along every export request, validated
pub(crate) fn headers(config: &TracingConfig) -> Result<Vec<(&'static str, String)>, TelemetryError> {
    let mut headers = Vec::with_capacity(2);

    if let Some(credential) = config.basic_auth.as_deref() {
        headers.push(("authorization", format!("Basic {credential}")));
    }

    let stream_name = config
        .stream_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_STREAM_NAME);
    headers.push(("stream-name", stream_name.to_owned()));

    for (name, value) in &headers {
        if http::HeaderValue::from_str(value).is_err() {
            return Err(TelemetryError::InvalidHeader { name: *name });
        }
    }

    Ok(headers)
}

/// Build the OTLP exporter sending protobuf over HTTP
pub(crate) fn http(config: &TracingConfig) -> Result<SpanExporter, TelemetryError> {
    let headers: HashMap<String, String> = headers(config)?
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect();

    let exporter = SpanExporter::builder()
        .with_http()
        .with_http_client(reqwest::Client::new())
        .with_endpoint(http_endpoint(config))
        .with_headers(headers)
        .build()?;

    Ok(exporter)
}

/// Build the OTLP exporter over gRPC
pub(crate) fn grpc(config: &TracingConfig) -> Result<SpanExporter, TelemetryError> {
    let mut metadata = MetadataMap::new();
    for (name, value) in headers(config)? {
        let value: MetadataValue<_> = value
            .parse()
            .map_err(|_| TelemetryError::InvalidHeader { name })?;
        metadata.insert(name, value);
    }

    let mut builder = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(base_url(config))
        .with_metadata(metadata);

    if config.secure {
        builder = builder.with_tls_config(ClientTlsConfig::new().with_enabled_roots());
    }

    Ok(builder.build()?)
}
