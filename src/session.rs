// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! A loader wired to an in-memory catalog of module specs

use crate::manifest::ModuleSpec;
use serde_json::Value;
use spacey_amd::{Loader, LoaderConfig, MemoryFetcher, ModuleId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Host-side loading session
pub struct Session {
    config: LoaderConfig,
    base: ModuleId,
    latency: Duration,
    specs: BTreeMap<ModuleId, ModuleSpec>,
    fetcher: Arc<MemoryFetcher<Value>>,
    loader: Loader<Value>,
}

impl Session {
    /// Create an empty session. Spec ids resolve against `base`.
    pub fn new(config: LoaderConfig, base: impl Into<ModuleId>, latency: Duration) -> Self {
        let fetcher = Arc::new(MemoryFetcher::<Value>::new().with_latency(latency));
        let loader = Loader::new(config.clone(), fetcher.clone());

        Self {
            config,
            base: base.into(),
            latency,
            specs: BTreeMap::new(),
            fetcher,
            loader,
        }
    }

    /// Canonical id of `raw` as written at the base
    pub fn canonicalize(&self, raw: &str) -> spacey_amd::Result<ModuleId> {
        self.loader.canonicalize(raw, &self.base)
    }

    /// Register a module spec, replacing any earlier spec for the same id.
    ///
    /// A module that was already fetched keeps its old definition until
    /// [`Session::reset`].
    pub fn add(&mut self, spec: ModuleSpec) -> spacey_amd::Result<ModuleId> {
        let id = self.canonicalize(&spec.id)?;
        self.fetcher.insert(id.clone(), spec.to_source(self.latency));
        self.specs.insert(id.clone(), spec);
        Ok(id)
    }

    /// Load `raw` and return its exports
    pub async fn require(&mut self, raw: &str) -> spacey_amd::Result<Value> {
        let id = self.canonicalize(raw)?;
        self.loader.import(id).await
    }

    /// Forget every loaded module; registered specs are kept
    pub fn reset(&mut self) {
        let fetcher = Arc::new(MemoryFetcher::<Value>::new().with_latency(self.latency));
        for (id, spec) in &self.specs {
            fetcher.insert(id.clone(), spec.to_source(self.latency));
        }

        tracing::debug!("resetting loader with {} registered modules", self.specs.len());
        self.loader = Loader::new(self.config.clone(), fetcher.clone());
        self.fetcher = fetcher;
    }

    /// Turn the load trace on or off. Takes effect on the next reset.
    pub fn set_trace(&mut self, trace: bool) {
        self.config.trace = trace;
    }

    /// The loader
    pub fn loader(&self) -> &Loader<Value> {
        &self.loader
    }

    /// The configuration new loaders are built from
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Registered specs by canonical id
    pub fn specs(&self) -> &BTreeMap<ModuleId, ModuleSpec> {
        &self.specs
    }

    /// Every fetch made since the last reset
    pub fn requests(&self) -> Vec<ModuleId> {
        self.fetcher.requests()
    }
}
