// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module loader - resolves dependency lists and runs factories

use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::module_system::define::{parse_define, DefineArg, Factory};
use crate::module_system::graph::DependencyGraph;
use crate::module_system::registry::{Continuation, ModuleStatus, Registry, WaiterId};
use crate::module_system::resolver::{PathResolver, UrlResolver};
use crate::module_system::ModuleId;
use crate::runtime::{Callback, DeclarationSink, EventLoop, Fetcher, LoaderMessage};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Entry in the optional load trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadEvent {
    /// The fetcher was asked for a module
    FetchRequested {
        /// Module id
        module: ModuleId,
    },
    /// A declaration passed the graph guard
    Declared {
        /// Module id
        module: ModuleId,
        /// Its dependencies
        dependencies: Vec<ModuleId>,
    },
    /// A continuation was queued on a loading module
    Queued {
        /// Module id
        module: ModuleId,
    },
    /// A continuation of a loaded module was deferred to a later turn
    Deferred {
        /// Module id
        module: ModuleId,
    },
    /// A module's factory ran and its exports were cached
    Loaded {
        /// Module id
        module: ModuleId,
    },
    /// A factory ran for a declaration nobody requested; nothing cached
    Evaluated {
        /// Module id
        module: ModuleId,
    },
    /// The fetcher reported a failure
    FetchFailed {
        /// Module id
        module: ModuleId,
        /// Reason reported by the fetcher
        reason: String,
    },
}

/// A declaration whose dependencies are still resolving
struct Waiter<V> {
    module: ModuleId,
    results: Vec<Option<V>>,
    remaining: usize,
    factory: Factory<V>,
}

type Ready<V> = VecDeque<(Continuation<V>, V)>;

/// Module loader
pub struct Loader<V> {
    config: LoaderConfig,
    /// Module records
    registry: Registry<V>,
    /// Declared edges
    graph: DependencyGraph,
    /// Deferred continuations and fetch replies
    event_loop: EventLoop<V>,
    fetcher: Arc<dyn Fetcher<V>>,
    resolver: Arc<dyn PathResolver>,
    /// Fan-in state of declarations awaiting dependencies
    waiters: HashMap<WaiterId, Waiter<V>>,
    next_waiter: u64,
    events: Vec<LoadEvent>,
}

impl<V: Clone + Send + 'static> Loader<V> {
    /// Create a loader using the default URL resolver
    pub fn new(config: LoaderConfig, fetcher: Arc<dyn Fetcher<V>>) -> Self {
        let resolver = Arc::new(UrlResolver::new(config.extension.clone()));
        let graph = DependencyGraph::new(config.cycle_check);

        Self {
            config,
            registry: Registry::new(),
            graph,
            event_loop: EventLoop::new(),
            fetcher,
            resolver,
            waiters: HashMap::new(),
            next_waiter: 0,
            events: Vec::new(),
        }
    }

    /// Replace the path resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Handle a `define()` call made by the script `context`
    pub fn define(&mut self, context: &ModuleId, args: Vec<DefineArg<V>>) -> Result<()> {
        let declaration = parse_define(args, context, self.resolver.as_ref())?;
        self.declare_module(declaration.id, declaration.dependencies, declaration.factory)
    }

    /// Declare a module with canonical dependency ids.
    ///
    /// Cycle errors are raised here, before anything is fetched.
    pub fn declare_module(
        &mut self,
        id: ModuleId,
        dependencies: Vec<ModuleId>,
        factory: Factory<V>,
    ) -> Result<()> {
        self.graph.declare(&id, &dependencies)?;

        debug!("declared {} with {} dependencies", id, dependencies.len());
        self.registry.set_dependencies(&id, &dependencies);
        self.record(|| LoadEvent::Declared {
            module: id.clone(),
            dependencies: dependencies.clone(),
        });

        if dependencies.is_empty() {
            return self.complete(&id, Vec::new(), factory);
        }

        let waiter = WaiterId(self.next_waiter);
        self.next_waiter += 1;
        self.waiters.insert(
            waiter,
            Waiter {
                module: id,
                results: (0..dependencies.len()).map(|_| None).collect(),
                remaining: dependencies.len(),
                factory,
            },
        );

        for (index, dependency) in dependencies.into_iter().enumerate() {
            self.resolve(dependency, Continuation::Slot { waiter, index })?;
        }

        Ok(())
    }

    /// Arrange for `on_ready` to receive the exports of `id`.
    ///
    /// Never invokes `on_ready` before returning.
    pub fn resolve(&mut self, id: ModuleId, on_ready: Continuation<V>) -> Result<()> {
        match self.registry.status(id.as_str()) {
            None => {
                self.registry.create_loading(id.clone(), on_ready)?;
                self.request_fetch(id);
            }
            Some(ModuleStatus::Loaded) => {
                let exports = self.registry.exports(id.as_str()).cloned().ok_or_else(|| {
                    LoadError::InvalidState {
                        module: id.clone(),
                        reason: "is loaded without exports",
                    }
                })?;
                trace!("deferring continuation of loaded {}", id);
                self.record(|| LoadEvent::Deferred { module: id.clone() });
                self.event_loop.defer(on_ready, exports);
            }
            Some(ModuleStatus::Loading) => {
                trace!("queueing continuation on {}", id);
                self.registry.enqueue(&id, on_ready)?;
                self.record(|| LoadEvent::Queued { module: id.clone() });
            }
        }
        Ok(())
    }

    fn request_fetch(&mut self, id: ModuleId) {
        debug!("fetching {}", id);
        self.record(|| LoadEvent::FetchRequested { module: id.clone() });
        self.event_loop.track_fetch(id.clone());
        let sink = DeclarationSink::new(id.clone(), self.event_loop.sender());
        self.fetcher.begin_fetch(&id, sink);
    }

    fn complete(&mut self, id: &ModuleId, dependencies: Vec<V>, factory: Factory<V>) -> Result<()> {
        let mut ready = VecDeque::new();
        self.complete_into(id, dependencies, factory, &mut ready)?;
        self.drain(ready)
    }

    fn complete_into(
        &mut self,
        id: &ModuleId,
        dependencies: Vec<V>,
        factory: Factory<V>,
        ready: &mut Ready<V>,
    ) -> Result<()> {
        let completion = self.registry.complete(id, dependencies, factory)?;

        if completion.cached {
            debug!("loaded {} ({} waiting)", id, completion.continuations.len());
            self.record(|| LoadEvent::Loaded { module: id.clone() });
        } else {
            debug!("evaluated {} without a record", id);
            self.record(|| LoadEvent::Evaluated { module: id.clone() });
        }

        for continuation in completion.continuations {
            ready.push_back((continuation, completion.exports.clone()));
        }
        Ok(())
    }

    /// Run continuations until none are left. Completing a module appends
    /// its own continuations to `ready` instead of recursing.
    ///
    /// A failed completion does not stop the drain: continuations already
    /// taken from their records still run. The first error is returned.
    fn drain(&mut self, mut ready: Ready<V>) -> Result<()> {
        let mut first_error = None;

        while let Some((continuation, exports)) = ready.pop_front() {
            match continuation {
                Continuation::Callback(callback) => callback(exports),
                Continuation::Slot { waiter, index } => {
                    let Some((module, results, factory)) = self.fill_slot(waiter, index, exports)
                    else {
                        continue;
                    };

                    if let Err(e) = self.complete_into(&module, results, factory, &mut ready) {
                        warn!("completing {} failed: {}", module, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Store one dependency's exports. Returns the declaration once its
    /// last dependency arrives.
    fn fill_slot(
        &mut self,
        waiter: WaiterId,
        index: usize,
        exports: V,
    ) -> Option<(ModuleId, Vec<V>, Factory<V>)> {
        let entry = self.waiters.get_mut(&waiter)?;
        let slot = entry.results.get_mut(index)?;
        if slot.is_some() {
            warn!("slot {} of {} filled twice", index, entry.module);
            return None;
        }

        *slot = Some(exports);
        entry.remaining -= 1;
        if entry.remaining > 0 {
            return None;
        }

        let done = self.waiters.remove(&waiter)?;
        Some((done.module, done.results.into_iter().flatten().collect(), done.factory))
    }

    fn dispatch(&mut self, callback: Callback<V>) -> Result<()> {
        match callback {
            Callback::Deferred {
                continuation,
                exports,
            } => self.drain(VecDeque::from([(continuation, exports)])),
            Callback::Message(LoaderMessage::Delivered { id, args }) => self.define(&id, args),
            Callback::Message(LoaderMessage::FetchFailed { id, reason }) => {
                warn!("fetch of {} failed: {}", id, reason);
                self.record(|| LoadEvent::FetchFailed {
                    module: id.clone(),
                    reason: reason.clone(),
                });
                Err(LoadError::fetch(id, reason))
            }
        }
    }

    /// Run every turn that is ready without waiting for fetches.
    ///
    /// Stops at the first error; the rest of the work stays queued.
    pub fn run_pending(&mut self) -> Result<()> {
        while let Some(callback) = self.event_loop.next_callback() {
            self.dispatch(callback)?;
        }
        Ok(())
    }

    /// Run turns, waiting on outstanding fetches, until nothing is left.
    pub async fn run_until_idle(&mut self) -> Result<()> {
        loop {
            self.run_pending()?;

            if !self.event_loop.has_fetches_in_flight() {
                return Ok(());
            }

            match self.event_loop.next_message().await {
                Some(message) => self.dispatch(Callback::Message(message))?,
                None => return Ok(()),
            }
        }
    }

    /// Load `id` and return its exports
    pub async fn import(&mut self, id: ModuleId) -> Result<V> {
        let (tx, mut rx) = oneshot::channel();
        self.resolve(
            id.clone(),
            Continuation::callback(move |exports| {
                let _ = tx.send(exports);
            }),
        )?;

        self.run_until_idle().await?;

        rx.try_recv().map_err(|_| LoadError::Stalled {
            module: id,
            waiting_on: self.registry.loading_ids(),
        })
    }

    /// Canonicalize `raw` as written inside `base`
    pub fn canonicalize(&self, raw: &str, base: &ModuleId) -> Result<ModuleId> {
        self.resolver.resolve(raw, base)
    }

    /// Status of a module
    pub fn status(&self, id: &str) -> Option<ModuleStatus> {
        self.registry.status(id)
    }

    /// Exports of a loaded module
    pub fn exports(&self, id: &str) -> Option<&V> {
        self.registry.exports(id)
    }

    /// The module registry
    pub fn registry(&self) -> &Registry<V> {
        &self.registry
    }

    /// The declared dependency graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Fetches not yet reported
    pub fn in_flight(&self) -> Vec<ModuleId> {
        self.event_loop.in_flight()
    }

    /// Check if there is queued work or an outstanding fetch
    pub fn has_pending_work(&self) -> bool {
        self.event_loop.has_pending_work()
    }

    /// Event loop turns run so far
    pub fn turns(&self) -> u64 {
        self.event_loop.turns()
    }

    /// The load trace (empty unless tracing is enabled)
    pub fn events(&self) -> &[LoadEvent] {
        &self.events
    }

    /// The loader configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn record(&mut self, event: impl FnOnce() -> LoadEvent) {
        if self.config.trace {
            self.events.push(event());
        }
    }
}
