/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Fluent construction of a [`FixEngine`].

use crate::engine::FixEngine;
use crate::settings::PlatformConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Builder for [`FixEngine`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
    platform: PlatformConfig,
}

impl EngineBuilder {
    /// Starts from default platform settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole platform configuration.
    #[must_use]
    pub fn platform(mut self, platform: PlatformConfig) -> Self {
        self.platform = platform;
        self
    }

    /// Loads platform settings from a key/value map.
    ///
    /// # Errors
    /// Propagates [`PlatformConfig::from_map`] failures.
    pub fn platform_map(
        mut self,
        settings: &HashMap<String, String>,
    ) -> Result<Self, rapidfix_core::error::ConfigError> {
        self.platform = PlatformConfig::from_map(settings)?;
        Ok(self)
    }

    /// Overrides the store directory.
    #[must_use]
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.platform.data_path = path.into();
        self
    }

    /// Overrides the log directory.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.platform.log_path = path.into();
        self
    }

    /// Overrides the tick period.
    #[must_use]
    pub fn update_delay(mut self, delay: Duration) -> Self {
        self.platform.update_delay = delay;
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> FixEngine {
        FixEngine::new(self.platform)
    }
}
