// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::Error as _};

use super::ConfigurationSection;
use crate::util::ConfigError;

fn default_name() -> String {
    "spanwise".to_owned()
}

fn default_slow_threshold_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

/// Monitoring of the commands sent to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApmConfig {
    /// Commands taking longer than this, in milliseconds, are flagged as slow
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,

    /// Attach details about every command to the active span
    #[serde(default = "default_true")]
    pub command_monitor: bool,

    /// Log the connection pool events
    #[serde(default = "default_true")]
    pub pool_monitor: bool,
}

impl Default for ApmConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: default_slow_threshold_ms(),
            command_monitor: true,
            pool_monitor: true,
        }
    }
}

impl ApmConfig {
    /// The threshold above which a command is considered slow
    #[must_use]
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

/// Configuration of the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseConfig {
    /// Name of the database
    #[serde(default = "default_name")]
    pub name: String,

    /// Monitoring of the store
    #[serde(default)]
    pub apm: ApmConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            apm: ApmConfig::default(),
        }
    }
}

impl ConfigurationSection for DatabaseConfig {
    const PATH: Option<&'static str> = Some("database");

    fn validate(&self, _figment: &figment::Figment) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(figment::error::Error::custom("database name must not be empty")
                .with_path("name")
                .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment, Jail,
        providers::{Format, Yaml},
    };

    use super::*;

    #[test]
    fn load_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    database:
                      name: users
                      apm:
                        slow_threshold_ms: 250
                        pool_monitor: false
                ",
            )?;

            let config = Figment::new()
                .merge(Yaml::file("config.yaml"))
                .extract_inner::<DatabaseConfig>("database")?;

            assert_eq!(config.name, "users");
            assert_eq!(config.apm.slow_threshold(), Duration::from_millis(250));
            assert!(config.apm.command_monitor);
            assert!(!config.apm.pool_monitor);

            Ok(())
        });
    }

    #[test]
    fn reject_empty_name() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
                    database:
                      name: ""
                "#,
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            assert!(DatabaseConfig::extract(&figment).is_err());

            Ok(())
        });
    }
}
