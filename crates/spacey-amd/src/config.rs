// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::module_system::CycleCheck;

/// Environment variable overriding [`LoaderConfig::extension`]
pub const ENV_EXTENSION: &str = "SPACEY_AMD_EXTENSION";
/// Environment variable overriding [`LoaderConfig::cycle_check`]
pub const ENV_CYCLE_CHECK: &str = "SPACEY_AMD_CYCLE_CHECK";
/// Environment variable overriding [`LoaderConfig::trace`]
pub const ENV_TRACE: &str = "SPACEY_AMD_TRACE";

/// Configuration for a [`Loader`](crate::Loader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Extension appended to canonical ids
    pub extension: String,

    /// Cycle detection performed at declaration time
    pub cycle_check: CycleCheck,

    /// Record a load trace
    pub trace: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extension: ".js".to_string(),
            cycle_check: CycleCheck::Direct,
            trace: false,
        }
    }
}

impl LoaderConfig {
    /// Parse configuration from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load defaults, then apply environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ext) = lookup(ENV_EXTENSION) {
            self.extension = ext;
        }

        if let Some(check) = lookup(ENV_CYCLE_CHECK) {
            match check.parse() {
                Ok(check) => self.cycle_check = check,
                Err(e) => tracing::warn!("ignoring {}: {}", ENV_CYCLE_CHECK, e),
            }
        }

        if let Some(trace) = lookup(ENV_TRACE) {
            self.trace = matches!(trace.trim(), "1" | "true" | "yes");
        }
    }
}
