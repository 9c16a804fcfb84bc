// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Set up of the process-wide tracer provider
//!
//! [`Telemetry`] binds a tracer provider to one of the configured exporters.
//! It is built once at startup, installed as the process-wide default with
//! [`Telemetry::install`], and shut down once before the process exits.

#![allow(clippy::module_name_repetitions)]

mod exporter;

use std::{
    sync::{LazyLock, OnceLock},
    time::Duration,
};

use opentelemetry::{
    InstrumentationScope, KeyValue,
    propagation::{TextMapCompositePropagator, TextMapPropagator},
    trace::TracerProvider as _,
};
use opentelemetry_sdk::{
    Resource,
    error::OTelSdkError,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{
        Sampler, SdkTracer, SdkTracerProvider, SpanExporter, TracerProviderBuilder,
        span_processor_with_async_runtime::BatchSpanProcessor,
    },
};
use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_semantic_conventions as semcov;
use spanwise_config::{TracingConfig, TracingExporterKind};
use spanwise_context::Deployment;

pub use self::exporter::{DEFAULT_ENDPOINT, DEFAULT_STREAM_NAME};

static SCOPE: LazyLock<InstrumentationScope> = LazyLock::new(|| {
    InstrumentationScope::builder("spanwise")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semcov::SCHEMA_URL)
        .build()
});

static INSTALLED: OnceLock<Telemetry> = OnceLock::new();

/// Errors which can happen while setting up or shutting down telemetry
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build the trace exporter")]
    Exporter(#[from] ExporterBuildError),

    #[error("invalid value for the {name} header")]
    InvalidHeader { name: &'static str },

    /// The rejected telemetry is handed back, so that it can be shut down
    #[error("telemetry was already installed")]
    AlreadyInstalled(Box<Telemetry>),

    #[error("timed out after {0:?} while flushing pending spans")]
    ShutdownTimeout(Duration),

    #[error("failed to shut down the tracer provider")]
    Shutdown(#[from] OTelSdkError),

    #[error("the shutdown task failed")]
    ShutdownTask(#[from] tokio::task::JoinError),
}

/// The tracer provider of the process, and the tracer spans are started with
#[derive(Debug)]
pub struct Telemetry {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    exporter_error: Option<TelemetryError>,
}

/// Builder for [`Telemetry`]
#[derive(Debug)]
pub struct TelemetryBuilder<'a> {
    config: &'a TracingConfig,
    provider: TracerProviderBuilder,
}

impl TelemetryBuilder<'_> {
    /// Add an exporter receiving every span as soon as it ends, next to the
    /// configured one
    #[must_use]
    pub fn with_simple_exporter<E: SpanExporter + 'static>(mut self, exporter: E) -> Self {
        self.provider = self.provider.with_simple_exporter(exporter);
        self
    }

    /// Build the tracer provider.
    ///
    /// Failing to build the exporter is not fatal: the error is logged and
    /// the provider is built without it, so spans are still created but not
    /// exported. The error is then available through
    /// [`Telemetry::exporter_error`].
    ///
    /// With one of the OTLP exporters, this must be called from within a
    /// Tokio runtime. Spans are then exported by a task on that runtime, and
    /// dropping the [`Telemetry`] blocks until that task is done: call
    /// [`Telemetry::shutdown`] first, as dropping it from the only thread of
    /// a current-thread runtime never returns.
    #[must_use]
    pub fn build(self) -> Telemetry {
        let config = self.config;
        let provider = self
            .provider
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource(config));

        let (provider, exporter_error) = match config.exporter {
            TracingExporterKind::OtlpHttp => with_batch_exporter(provider, exporter::http(config)),
            TracingExporterKind::OtlpGrpc => with_batch_exporter(provider, exporter::grpc(config)),
            TracingExporterKind::Stdout => (
                provider.with_simple_exporter(opentelemetry_stdout::SpanExporter::default()),
                None,
            ),
            TracingExporterKind::None => (provider, None),
        };

        let provider = provider.build();
        let tracer = provider.tracer_with_scope(SCOPE.clone());

        Telemetry {
            provider,
            tracer,
            exporter_error,
        }
    }
}

fn with_batch_exporter<E: SpanExporter + 'static>(
    provider: TracerProviderBuilder,
    exporter: Result<E, TelemetryError>,
) -> (TracerProviderBuilder, Option<TelemetryError>) {
    match exporter {
        Ok(exporter) => {
            let processor =
                BatchSpanProcessor::builder(exporter, opentelemetry_sdk::runtime::Tokio).build();
            (provider.with_span_processor(processor), None)
        }

        Err(error) => {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "Failed to set up the trace exporter, spans will not be exported"
            );
            (provider, Some(error))
        }
    }
}

/// The attributes describing this service, attached to every exported span
fn resource(config: &TracingConfig) -> Resource {
    let mut attributes = vec![KeyValue::new(
        semcov::resource::SERVICE_VERSION,
        config.service_version.clone(),
    )];

    if config.exporter == TracingExporterKind::OtlpHttp {
        attributes.push(KeyValue::new("environment", config.environment.clone()));
    }

    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_schema_url(attributes, semcov::SCHEMA_URL)
        .build()
}

fn propagator() -> TextMapCompositePropagator {
    let propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>> = vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ];

    TextMapCompositePropagator::new(propagators)
}

impl Telemetry {
    /// Start building the telemetry for the given configuration
    #[must_use]
    pub fn builder(config: &TracingConfig) -> TelemetryBuilder<'_> {
        TelemetryBuilder {
            config,
            provider: SdkTracerProvider::builder(),
        }
    }

    /// The tracer to start spans with
    #[must_use]
    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    /// The error which prevented the exporter from being set up, if any
    #[must_use]
    pub fn exporter_error(&self) -> Option<&TelemetryError> {
        self.exporter_error.as_ref()
    }

    /// Install this as the process-wide tracer provider, along with the W3C
    /// trace context and baggage propagators.
    ///
    /// # Errors
    ///
    /// Returns an error if telemetry was already installed in this process.
    /// The error holds this telemetry, which should be shut down before it is
    /// dropped.
    pub fn install(self) -> Result<&'static Self, TelemetryError> {
        if let Err(rejected) = INSTALLED.set(self) {
            return Err(TelemetryError::AlreadyInstalled(Box::new(rejected)));
        }
        let Some(telemetry) = installed() else {
            unreachable!()
        };

        opentelemetry::global::set_tracer_provider(telemetry.provider.clone());
        opentelemetry::global::set_text_map_propagator(propagator());

        Ok(telemetry)
    }

    /// Flush the pending spans and shut the provider down, waiting at most
    /// for the given duration.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush did not finish in time, or if the
    /// provider failed to shut down, for example because it was already shut
    /// down.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), TelemetryError> {
        let provider = self.provider.clone();
        let task = tokio::task::spawn_blocking(move || provider.shutdown());

        match tokio::time::timeout(timeout, task).await {
            Ok(result) => Ok(result??),
            Err(_elapsed) => Err(TelemetryError::ShutdownTimeout(timeout)),
        }
    }
}

/// The telemetry installed with [`Telemetry::install`], if any
#[must_use]
pub fn installed() -> Option<&'static Telemetry> {
    INSTALLED.get()
}

/// The deployment metadata described by the configuration
#[must_use]
pub fn deployment(config: &TracingConfig) -> Deployment {
    Deployment {
        service_name: config.service_name.clone(),
        environment: config.environment.clone(),
        version: config.service_version.clone(),
        region: config.region.clone(),
    }
}
