// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Fetch collaborators
//!
//! The loader asks a [`Fetcher`] to begin delivering a module and moves
//! on. The fetcher answers later through the [`DeclarationSink`] it was
//! handed, either with the module's `define()` arguments or a failure.

use crate::module_system::{DefineArg, ModuleId};
use crate::runtime::event_loop::LoaderMessage;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;

/// Begins delivering a module's declaration. Fire-and-forget.
pub trait Fetcher<V>: Send + Sync {
    /// Start fetching `id`; report through `sink` when done
    fn begin_fetch(&self, id: &ModuleId, sink: DeclarationSink<V>);
}

/// One-shot reply handle for a single fetch.
///
/// Dropping the sink without using it reports the fetch as failed.
pub struct DeclarationSink<V> {
    id: ModuleId,
    tx: Option<mpsc::UnboundedSender<LoaderMessage<V>>>,
}

impl<V> DeclarationSink<V> {
    pub(crate) fn new(id: ModuleId, tx: mpsc::UnboundedSender<LoaderMessage<V>>) -> Self {
        Self { id, tx: Some(tx) }
    }

    /// The module being fetched
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Deliver the module script's `define()` arguments
    pub fn define(mut self, args: Vec<DefineArg<V>>) {
        let id = self.id.clone();
        self.send(LoaderMessage::Delivered { id, args });
    }

    /// Report that the module could not be fetched
    pub fn fail(mut self, reason: impl Into<String>) {
        let id = self.id.clone();
        self.send(LoaderMessage::FetchFailed {
            id,
            reason: reason.into(),
        });
    }

    fn send(&mut self, message: LoaderMessage<V>) {
        if let Some(tx) = self.tx.take() {
            if tx.send(message).is_err() {
                tracing::debug!("loader for {} is gone, dropping reply", self.id);
            }
        }
    }
}

impl<V> Drop for DeclarationSink<V> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!("fetch for {} abandoned without a reply", self.id);
            let id = self.id.clone();
            self.send(LoaderMessage::FetchFailed {
                id,
                reason: "fetch abandoned without a declaration".to_string(),
            });
        }
    }
}

/// Source of one module in a [`MemoryFetcher`]
pub struct ModuleSource<V> {
    args: Vec<DefineArg<V>>,
    latency: Option<Duration>,
}

impl<V> ModuleSource<V> {
    /// A module whose script calls `define(args...)`
    pub fn new(args: Vec<DefineArg<V>>) -> Self {
        Self {
            args,
            latency: None,
        }
    }

    /// Override the fetcher's default latency for this module
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// In-memory module catalog delivering on spawned tokio tasks.
///
/// Each source is handed out once. Requests for unknown ids fail.
pub struct MemoryFetcher<V> {
    sources: Mutex<HashMap<ModuleId, ModuleSource<V>>>,
    requests: Mutex<Vec<ModuleId>>,
    latency: Duration,
}

impl<V> MemoryFetcher<V> {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Delay every delivery by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register the script for `id`, replacing any earlier one
    pub fn insert(&self, id: impl Into<ModuleId>, source: ModuleSource<V>) {
        self.sources.lock().insert(id.into(), source);
    }

    /// Check if a source is still waiting to be fetched
    pub fn contains(&self, id: &str) -> bool {
        self.sources.lock().contains_key(id)
    }

    /// Every fetch requested so far, in order
    pub fn requests(&self) -> Vec<ModuleId> {
        self.requests.lock().clone()
    }

    /// How many times `id` was requested
    pub fn request_count(&self, id: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.as_str() == id).count()
    }
}

impl<V> Default for MemoryFetcher<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + 'static> Fetcher<V> for MemoryFetcher<V> {
    fn begin_fetch(&self, id: &ModuleId, sink: DeclarationSink<V>) {
        self.requests.lock().push(id.clone());
        let source = self.sources.lock().remove(id);
        let latency = source
            .as_ref()
            .and_then(|s| s.latency)
            .unwrap_or(self.latency);

        tokio::spawn(async move {
            if latency.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(latency).await;
            }

            match source {
                Some(source) => sink.define(source.args),
                None => {
                    let reason = format!("no source registered for '{}'", sink.id());
                    sink.fail(reason);
                }
            }
        });
    }
}

/// Parks every request so the host decides when, and in what order,
/// modules are delivered.
pub struct RecordingFetcher<V> {
    parked: Mutex<VecDeque<DeclarationSink<V>>>,
    requests: Mutex<Vec<ModuleId>>,
}

impl<V> RecordingFetcher<V> {
    /// Create a fetcher with nothing parked
    pub fn new() -> Self {
        Self {
            parked: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch requested so far, in order
    pub fn requests(&self) -> Vec<ModuleId> {
        self.requests.lock().clone()
    }

    /// Ids parked and awaiting delivery, in request order
    pub fn parked(&self) -> Vec<ModuleId> {
        self.parked.lock().iter().map(|s| s.id().clone()).collect()
    }

    /// Take the parked sink for `id`
    pub fn take(&self, id: &str) -> Option<DeclarationSink<V>> {
        let mut parked = self.parked.lock();
        let pos = parked.iter().position(|s| s.id().as_str() == id)?;
        parked.remove(pos)
    }

    /// Deliver `args` for `id`. Returns false if `id` is not parked.
    pub fn deliver(&self, id: &str, args: Vec<DefineArg<V>>) -> bool {
        match self.take(id) {
            Some(sink) => {
                sink.define(args);
                true
            }
            None => false,
        }
    }

    /// Fail the parked fetch for `id`. Returns false if `id` is not parked.
    pub fn fail(&self, id: &str, reason: &str) -> bool {
        match self.take(id) {
            Some(sink) => {
                sink.fail(reason);
                true
            }
            None => false,
        }
    }
}

impl<V> Default for RecordingFetcher<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send> Fetcher<V> for RecordingFetcher<V> {
    fn begin_fetch(&self, id: &ModuleId, sink: DeclarationSink<V>) {
        self.requests.lock().push(id.clone());
        self.parked.lock().push_back(sink);
    }
}
