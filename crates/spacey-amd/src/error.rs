// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use crate::module_system::ModuleId;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can occur while declaring or loading modules
#[derive(Debug, Error)]
pub enum LoadError {
    /// Malformed define() arguments
    #[error("ShapeError: {0}")]
    Shape(String),

    /// A declaration named a module other than the script that declared it
    #[error("module name '{found}' must match the loading script '{expected}'")]
    IdentityMismatch {
        /// Id of the script being evaluated
        expected: ModuleId,
        /// Id the declaration resolved to
        found: ModuleId,
    },

    /// Direct two-party dependency conflict
    #[error("CycleError: {} conflict with module '{module}'", join_ids(.conflicts, ", "))]
    Cycle {
        /// The module being declared
        module: ModuleId,
        /// Dependencies that already depend on `module`
        conflicts: Vec<ModuleId>,
    },

    /// Dependency cycle spanning more than two modules
    #[error("CycleError: {}", join_ids(.path, " -> "))]
    CyclePath {
        /// The cycle, starting and ending with the declared module
        path: Vec<ModuleId>,
    },

    /// The fetch collaborator could not deliver a module
    #[error("FetchError: failed to load '{module}': {reason}")]
    Fetch {
        /// Module that failed to load
        module: ModuleId,
        /// Reason reported by the collaborator
        reason: String,
    },

    /// Module identifier resolution error
    #[error("Error resolving module '{specifier}': {reason}")]
    Resolve {
        /// Raw identifier
        specifier: String,
        /// Reason for failure
        reason: String,
    },

    /// A record already exists for this id
    #[error("module '{0}' is already registered")]
    AlreadyRegistered(ModuleId),

    /// Operation not valid for the record's current state
    #[error("module '{module}' {reason}")]
    InvalidState {
        /// Module id
        module: ModuleId,
        /// What was wrong
        reason: &'static str,
    },

    /// A module was completed twice
    #[error("module '{0}' has already been loaded")]
    AlreadyLoaded(ModuleId),

    /// The loader went idle with the module still loading
    #[error(
        "module '{module}' never finished loading (still loading: {})",
        join_ids(.waiting_on, ", ")
    )]
    Stalled {
        /// Module that was requested
        module: ModuleId,
        /// Modules left in the loading state
        waiting_on: Vec<ModuleId>,
    },

    /// Configuration parsing error
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl LoadError {
    /// Create a new ShapeError
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// Create a resolution error
    pub fn resolve(specifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolve {
            specifier: specifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a fetch error
    pub fn fetch(module: ModuleId, reason: impl Into<String>) -> Self {
        Self::Fetch {
            module,
            reason: reason.into(),
        }
    }

    /// Whether this error is raised synchronously by a declaration
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            Self::Shape(_)
                | Self::IdentityMismatch { .. }
                | Self::Cycle { .. }
                | Self::CyclePath { .. }
                | Self::Resolve { .. }
        )
    }
}

fn join_ids(ids: &[ModuleId], sep: &str) -> String {
    ids.iter()
        .map(ModuleId::as_str)
        .collect::<Vec<_>>()
        .join(sep)
}
