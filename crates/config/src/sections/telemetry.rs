// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::Error as _};
use serde_with::skip_serializing_none;

use super::ConfigurationSection;
use crate::util::ConfigError;

fn default_service_name() -> String {
    "default".to_owned()
}

fn default_service_version() -> String {
    "0.0.1".to_owned()
}

fn default_environment() -> String {
    "development".to_owned()
}

fn default_region() -> String {
    "local".to_owned()
}

fn default_url_path() -> String {
    "/api/default/v1/traces".to_owned()
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn endpoint_example() -> &'static str {
    "127.0.0.1:5081"
}

fn basic_auth_example() -> &'static str {
    "YWRtaW46cGFzc3dvcmQ="
}

/// Exporter to use when exporting traces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TracingExporterKind {
    /// Export traces with the OpenTelemetry protocol, as protobuf over HTTP
    #[default]
    OtlpHttp,

    /// Export traces with the OpenTelemetry protocol, over gRPC
    OtlpGrpc,

    /// Export traces to the standard output. Only useful for debugging
    Stdout,

    /// Don't export traces
    None,
}

/// Configuration related to exporting traces
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct TracingConfig {
    /// Exporter to use when exporting traces
    #[serde(default)]
    pub exporter: TracingExporterKind,

    /// Name of the service, used to display traces in backends
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Version of the service
    #[serde(default = "default_service_version")]
    pub service_version: String,

    /// Environment the service is deployed in
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Region the service is deployed in
    #[serde(default = "default_region")]
    pub region: String,

    /// Address of the collector, as `host:port`
    ///
    /// Defaults to `127.0.0.1:5081` if not set.
    #[schemars(example = "endpoint_example")]
    pub endpoint: Option<String>,

    /// Whether to use TLS to reach the collector
    #[serde(default)]
    pub secure: bool,

    /// Credential sent in the `Authorization: Basic` header, usually
    /// `base64(user:password)`
    #[schemars(example = "basic_auth_example")]
    pub basic_auth: Option<String>,

    /// Stream the collector should store the traces in
    ///
    /// Defaults to `default` if not set.
    pub stream_name: Option<String>,

    /// Path of the traces endpoint on the collector, for the HTTP exporter
    #[serde(default = "default_url_path")]
    pub url_path: String,

    /// How long to wait for pending spans to be exported on shutdown, in
    /// seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            exporter: TracingExporterKind::default(),
            service_name: default_service_name(),
            service_version: default_service_version(),
            environment: default_environment(),
            region: default_region(),
            endpoint: None,
            secure: false,
            basic_auth: None,
            stream_name: None,
            url_path: default_url_path(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl TracingConfig {
    /// How long to wait for pending spans to be exported on shutdown
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.url_path.starts_with('/') {
            return Err(figment::error::Error::custom("URL path must start with a '/'")
                .with_path("tracing.url_path")
                .into());
        }

        if let Some(endpoint) = &self.endpoint
            && (endpoint.is_empty() || endpoint.contains(char::is_whitespace))
        {
            return Err(figment::error::Error::custom(
                "endpoint must be a non-empty host:port pair",
            )
            .with_path("tracing.endpoint")
            .into());
        }

        if self.shutdown_timeout_secs == 0 {
            return Err(figment::error::Error::custom(
                "shutdown timeout must be at least one second",
            )
            .with_path("tracing.shutdown_timeout_secs")
            .into());
        }

        Ok(())
    }
}

/// Configuration related to sending monitoring data
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct TelemetryConfig {
    /// Configuration related to exporting traces
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl ConfigurationSection for TelemetryConfig {
    const PATH: Option<&'static str> = Some("telemetry");

    fn validate(&self, _figment: &figment::Figment) -> Result<(), ConfigError> {
        self.tracing.validate()
    }
}
