// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use figment::Figment;
use serde::de::DeserializeOwned;

/// Error returned when loading or validating a configuration section
pub type ConfigError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Trait implemented by all configuration sections, to load them on their own
/// from the whole configuration.
pub trait ConfigurationSection: Sized + DeserializeOwned {
    /// Where this section lives relative to the root, as a dotted path.
    const PATH: Option<&'static str> = None;

    /// Validate the configuration section
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    fn validate(&self, _figment: &Figment) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Extract and validate the section from a Figment instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration could not be loaded or is
    /// invalid
    fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        let this: Self = match Self::PATH {
            Some(path) => figment.extract_inner(path)?,
            None => figment.extract()?,
        };

        this.validate(figment)?;
        Ok(this)
    }
}
