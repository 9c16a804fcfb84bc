// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use figment::Figment;
use spanwise_config::{ConfigurationSection, RootConfig, TracingExporterKind};
use tokio::io::AsyncWriteExt;
use tracing::{info, info_span, warn};

#[derive(Parser, Debug)]
pub(super) struct Options {
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Parser, Debug)]
enum Subcommand {
    /// Validate the configuration, and show where spans will be sent
    Check,

    /// Print the resolved configuration, defaults included, as YAML
    Dump {
        /// Write to this file instead of the standard output
        #[clap(short, long)]
        output: Option<Utf8PathBuf>,
    },

    /// Print the JSON schema of the configuration file
    Schema,
}

async fn write_out(output: Option<Utf8PathBuf>, contents: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            info!(%path, "Writing to file");
            tokio::fs::write(path, contents).await?;
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(contents.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        use Subcommand as SC;
        match self.subcommand {
            SC::Check => {
                let _span = info_span!("cli.config.check").entered();
                let config = RootConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;

                let tracing = &config.telemetry.tracing;
                match tracing.exporter {
                    TracingExporterKind::None => warn!("Spans will not be exported"),
                    TracingExporterKind::Stdout => info!("Spans will be printed to stdout"),
                    TracingExporterKind::OtlpHttp | TracingExporterKind::OtlpGrpc => info!(
                        exporter = ?tracing.exporter,
                        endpoint = tracing.endpoint.as_deref().unwrap_or("default"),
                        "Spans will be sent to the collector"
                    ),
                }

                info!(listen = %config.http.listen, "Configuration looks good");
            }

            SC::Dump { output } => {
                let config = RootConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;
                write_out(output, &serde_yaml::to_string(&config)?).await?;
            }

            SC::Schema => {
                let schema = schemars::schema_for!(RootConfig);
                write_out(None, &serde_json::to_string_pretty(&schema)?).await?;
            }
        }

        Ok(ExitCode::SUCCESS)
    }
}
