// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scheduling and fetch collaborators

mod event_loop;
mod fetch;

pub use event_loop::{Callback, EventLoop, LoaderMessage};
pub use fetch::{DeclarationSink, Fetcher, MemoryFetcher, ModuleSource, RecordingFetcher};
