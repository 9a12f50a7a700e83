// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Cooperative event loop for the loader
//!
//! Two sources of work feed the loop:
//!
//! - deferred continuations, queued when a dependency is already loaded
//!   so they never run inside the caller's own frame
//! - messages from fetch collaborators, delivered over a channel

use crate::module_system::{Continuation, DefineArg, ModuleId};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use tokio::sync::mpsc;

/// Messages sent to the loop by fetch collaborators
pub enum LoaderMessage<V> {
    /// A fetched module's script called `define()`
    Delivered {
        /// The id that was fetched
        id: ModuleId,
        /// Raw `define()` arguments
        args: Vec<DefineArg<V>>,
    },
    /// The module could not be fetched
    FetchFailed {
        /// The id that was fetched
        id: ModuleId,
        /// Reason reported by the collaborator
        reason: String,
    },
}

impl<V> LoaderMessage<V> {
    /// The fetched module this message is about
    pub fn id(&self) -> &ModuleId {
        match self {
            Self::Delivered { id, .. } | Self::FetchFailed { id, .. } => id,
        }
    }
}

impl<V> fmt::Debug for LoaderMessage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered { id, args } => f
                .debug_struct("Delivered")
                .field("id", id)
                .field("args", args)
                .finish(),
            Self::FetchFailed { id, reason } => f
                .debug_struct("FetchFailed")
                .field("id", id)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Work ready to run on the next turn
#[derive(Debug)]
pub enum Callback<V> {
    /// Continuation of an already loaded module
    Deferred {
        /// The continuation to invoke
        continuation: Continuation<V>,
        /// Exports to invoke it with
        exports: V,
    },
    /// Collaborator message
    Message(LoaderMessage<V>),
}

/// The loader's event loop
pub struct EventLoop<V> {
    /// Deferred continuations, FIFO
    deferred: VecDeque<(Continuation<V>, V)>,
    /// Channel handed to collaborators
    event_tx: mpsc::UnboundedSender<LoaderMessage<V>>,
    /// Channel for receiving collaborator messages
    event_rx: mpsc::UnboundedReceiver<LoaderMessage<V>>,
    /// Fetches requested but not yet reported
    in_flight: HashSet<ModuleId>,
    /// Callbacks handed out so far
    turns: u64,
}

impl<V> EventLoop<V> {
    /// Create a new event loop
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            deferred: VecDeque::new(),
            event_tx,
            event_rx,
            in_flight: HashSet::new(),
            turns: 0,
        }
    }

    /// A sender for collaborators to report on
    pub fn sender(&self) -> mpsc::UnboundedSender<LoaderMessage<V>> {
        self.event_tx.clone()
    }

    /// Queue a continuation for a later turn
    pub fn defer(&mut self, continuation: Continuation<V>, exports: V) {
        self.deferred.push_back((continuation, exports));
    }

    /// Remember that a fetch for `id` is outstanding
    pub fn track_fetch(&mut self, id: ModuleId) {
        self.in_flight.insert(id);
    }

    /// Next callback that can run without waiting.
    ///
    /// Deferred continuations go first, then messages that have already
    /// arrived.
    pub fn next_callback(&mut self) -> Option<Callback<V>> {
        if let Some((continuation, exports)) = self.deferred.pop_front() {
            self.turns += 1;
            return Some(Callback::Deferred {
                continuation,
                exports,
            });
        }

        match self.event_rx.try_recv() {
            Ok(message) => {
                self.settle(&message);
                Some(Callback::Message(message))
            }
            Err(_) => None,
        }
    }

    /// Wait for the next collaborator message
    pub async fn next_message(&mut self) -> Option<LoaderMessage<V>> {
        let message = self.event_rx.recv().await?;
        self.settle(&message);
        Some(message)
    }

    fn settle(&mut self, message: &LoaderMessage<V>) {
        self.turns += 1;
        if !self.in_flight.remove(message.id()) {
            tracing::trace!("message for {} was not an outstanding fetch", message.id());
        }
    }

    /// Check if deferred continuations are queued
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Check if any fetch is still outstanding
    pub fn has_fetches_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Check if there's pending work
    pub fn has_pending_work(&self) -> bool {
        self.has_deferred() || self.has_fetches_in_flight()
    }

    /// Outstanding fetches, sorted
    pub fn in_flight(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self.in_flight.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of callbacks handed out so far
    pub fn turns(&self) -> u64 {
        self.turns
    }
}

impl<V> Default for EventLoop<V> {
    fn default() -> Self {
        Self::new()
    }
}
