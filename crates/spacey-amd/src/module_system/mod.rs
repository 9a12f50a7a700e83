// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! AMD-style module system
//!
//! - `define()` argument shapes and declaration parsing
//! - Registry of module records and their lifecycle
//! - Declaration-time dependency cycle checks
//! - The loader that fans out dependency loads and fans back in

pub mod define;
mod graph;
mod id;
mod loader;
mod registry;
mod resolver;

pub use define::{parse_define, Declaration, DefineArg, Factory};
pub use graph::{CycleCheck, DependencyGraph};
pub use id::ModuleId;
pub use loader::{LoadEvent, Loader};
pub use registry::{Completion, Continuation, ModuleRecord, ModuleStatus, Registry, WaiterId};
pub use resolver::{PathResolver, UrlResolver};
