// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-amd
//!
//! Asynchronous AMD-style module loading for the Spacey runtime.
//!
//! Given a module id, the loader resolves the module's declared
//! dependencies (recursively, each exactly once), then runs the module's
//! factory with the dependencies' exports and caches the result.
//!
//! - Each module is fetched and its factory run at most once
//! - Factories receive dependency exports in declaration order
//! - Continuations of an already loaded module never run synchronously
//! - Two-party dependency cycles are rejected before anything is fetched
//!
//! Fetching source and canonicalizing identifiers are delegated to a
//! [`Fetcher`] and a [`PathResolver`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_amd::{DefineArg, Loader, LoaderConfig, MemoryFetcher, ModuleSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> spacey_amd::Result<()> {
//!     let fetcher = Arc::new(MemoryFetcher::<i64>::new());
//!     fetcher.insert("app/x.js", ModuleSource::new(vec![DefineArg::factory(|_| 1)]));
//!     fetcher.insert("app/y.js", ModuleSource::new(vec![
//!         DefineArg::deps(["./x"]),
//!         DefineArg::factory(|deps: Vec<i64>| deps[0] + 1),
//!     ]));
//!
//!     let mut loader = Loader::new(LoaderConfig::default(), fetcher);
//!     assert_eq!(loader.import("app/y.js".into()).await?, 2);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod module_system;
pub mod runtime;

// Re-exports
pub use config::LoaderConfig;
pub use error::{LoadError, Result};
pub use module_system::{
    CycleCheck, Declaration, DefineArg, Factory, LoadEvent, Loader, ModuleId, ModuleStatus,
    PathResolver, UrlResolver,
};
pub use runtime::{DeclarationSink, Fetcher, MemoryFetcher, ModuleSource, RecordingFetcher};

/// Version of the spacey-amd loader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
