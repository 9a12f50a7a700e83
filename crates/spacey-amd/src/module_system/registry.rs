// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry: canonical id -> module record

use crate::error::{LoadError, Result};
use crate::module_system::define::Factory;
use crate::module_system::ModuleId;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Lifecycle state of a module record. Never goes back to `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Requested, exports not yet computed
    Loading,
    /// Factory has run and exports are cached
    Loaded,
}

/// Identifies a declaration waiting on its dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(pub(crate) u64);

/// Work to run once a module's exports exist
pub enum Continuation<V> {
    /// Fill dependency slot `index` of a waiting declaration
    Slot {
        /// The waiting declaration
        waiter: WaiterId,
        /// Position in its dependency list
        index: usize,
    },
    /// Host callback
    Callback(Box<dyn FnOnce(V) + Send + 'static>),
}

impl<V> Continuation<V> {
    /// Wrap a host callback
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(V) + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }
}

impl<V> fmt::Debug for Continuation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot { waiter, index } => f
                .debug_struct("Slot")
                .field("waiter", waiter)
                .field("index", index)
                .finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Registry entry for one module
pub struct ModuleRecord<V> {
    id: ModuleId,
    status: ModuleStatus,
    dependencies: Vec<ModuleId>,
    pending: VecDeque<Continuation<V>>,
    exports: Option<V>,
}

impl<V> ModuleRecord<V> {
    /// Canonical id
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Current status
    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    /// Declared dependencies (empty until the declaration arrives)
    pub fn dependencies(&self) -> &[ModuleId] {
        &self.dependencies
    }

    /// Cached exports, once loaded
    pub fn exports(&self) -> Option<&V> {
        self.exports.as_ref()
    }

    /// Number of continuations waiting on this module
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<V: fmt::Debug> fmt::Debug for ModuleRecord<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("dependencies", &self.dependencies)
            .field("pending", &self.pending.len())
            .field("exports", &self.exports)
            .finish()
    }
}

/// Result of completing a module
#[derive(Debug)]
pub struct Completion<V> {
    /// The factory's return value
    pub exports: V,
    /// Continuations drained from the record, in enqueue order
    pub continuations: Vec<Continuation<V>>,
    /// Whether the exports were cached in a record
    pub cached: bool,
}

/// Owns every module record
pub struct Registry<V> {
    records: HashMap<ModuleId, ModuleRecord<V>>,
}

impl<V> Registry<V> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Look up a record
    pub fn get(&self, id: &str) -> Option<&ModuleRecord<V>> {
        self.records.get(id)
    }

    /// Check if a record exists
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Status of a record
    pub fn status(&self, id: &str) -> Option<ModuleStatus> {
        self.records.get(id).map(ModuleRecord::status)
    }

    /// Cached exports of a loaded module
    pub fn exports(&self, id: &str) -> Option<&V> {
        self.records.get(id).and_then(ModuleRecord::exports)
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self.records.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids still loading, sorted
    pub fn loading_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self
            .records
            .values()
            .filter(|r| r.status == ModuleStatus::Loading)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Create a loading record whose queue holds `initial`
    pub fn create_loading(&mut self, id: ModuleId, initial: Continuation<V>) -> Result<()> {
        if self.records.contains_key(&id) {
            return Err(LoadError::AlreadyRegistered(id));
        }

        let record = ModuleRecord {
            id: id.clone(),
            status: ModuleStatus::Loading,
            dependencies: Vec::new(),
            pending: VecDeque::from([initial]),
            exports: None,
        };
        self.records.insert(id, record);
        Ok(())
    }

    /// Queue a continuation on a loading record
    pub fn enqueue(&mut self, id: &ModuleId, continuation: Continuation<V>) -> Result<()> {
        let record = self.records.get_mut(id).ok_or_else(|| LoadError::InvalidState {
            module: id.clone(),
            reason: "has no record to queue on",
        })?;

        if record.status != ModuleStatus::Loading {
            return Err(LoadError::InvalidState {
                module: id.clone(),
                reason: "is already loaded",
            });
        }

        record.pending.push_back(continuation);
        Ok(())
    }

    /// Record the dependencies declared for a loading module.
    /// Ignored for unknown or loaded modules.
    pub fn set_dependencies(&mut self, id: &ModuleId, dependencies: &[ModuleId]) {
        if let Some(record) = self.records.get_mut(id) {
            if record.status == ModuleStatus::Loading {
                record.dependencies = dependencies.to_vec();
            }
        }
    }
}

impl<V: Clone> Registry<V> {
    /// Run the factory and transition the module to loaded.
    ///
    /// Without a record the factory still runs but nothing is cached. A
    /// loaded record is rejected before the factory runs.
    pub fn complete(
        &mut self,
        id: &ModuleId,
        dependencies: Vec<V>,
        factory: Factory<V>,
    ) -> Result<Completion<V>> {
        let Some(record) = self.records.get_mut(id) else {
            return Ok(Completion {
                exports: factory(dependencies),
                continuations: Vec::new(),
                cached: false,
            });
        };

        if record.status == ModuleStatus::Loaded {
            return Err(LoadError::AlreadyLoaded(id.clone()));
        }

        let exports = factory(dependencies);
        record.status = ModuleStatus::Loaded;
        record.exports = Some(exports.clone());

        Ok(Completion {
            exports,
            continuations: record.pending.drain(..).collect(),
            cached: true,
        })
    }
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn slot(index: usize) -> Continuation<i32> {
        Continuation::Slot {
            waiter: WaiterId(0),
            index,
        }
    }

    #[test]
    fn test_single_registration() {
        let mut registry = Registry::new();
        registry.create_loading("a.js".into(), slot(0)).unwrap();

        let err = registry.create_loading("a.js".into(), slot(1)).unwrap_err();
        assert!(matches!(err, LoadError::AlreadyRegistered(_)));
        assert_eq!(registry.get("a.js").unwrap().pending_len(), 1);
    }

    #[test]
    fn test_enqueue_requires_loading_record() {
        let mut registry: Registry<i32> = Registry::new();
        assert!(registry.enqueue(&"a.js".into(), slot(0)).is_err());

        registry.create_loading("a.js".into(), slot(0)).unwrap();
        registry.enqueue(&"a.js".into(), slot(1)).unwrap();
        registry.complete(&"a.js".into(), vec![], Box::new(|_| 1)).unwrap();

        assert!(matches!(
            registry.enqueue(&"a.js".into(), slot(2)),
            Err(LoadError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_complete_drains_in_enqueue_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();

        let push = |tag: &'static str| {
            let seen = Arc::clone(&seen);
            Continuation::callback(move |v: i32| seen.lock().push((tag, v)))
        };

        let id = ModuleId::from("m.js");
        registry.create_loading(id.clone(), push("c1")).unwrap();
        registry.enqueue(&id, push("c2")).unwrap();
        registry.enqueue(&id, push("c3")).unwrap();

        let completion = registry.complete(&id, vec![], Box::new(|_| 7)).unwrap();
        assert!(completion.cached);
        assert_eq!(completion.exports, 7);
        for continuation in completion.continuations {
            match continuation {
                Continuation::Callback(f) => f(completion.exports),
                Continuation::Slot { .. } => unreachable!(),
            }
        }

        assert_eq!(*seen.lock(), vec![("c1", 7), ("c2", 7), ("c3", 7)]);
        assert_eq!(registry.status("m.js"), Some(ModuleStatus::Loaded));
        assert_eq!(registry.exports("m.js"), Some(&7));
        assert_eq!(registry.get("m.js").unwrap().pending_len(), 0);
    }

    #[test]
    fn test_complete_without_record_is_not_cached() {
        let mut registry = Registry::new();
        let completion = registry
            .complete(&"root.js".into(), vec![1, 2], Box::new(|deps: Vec<i32>| deps.iter().sum()))
            .unwrap();

        assert_eq!(completion.exports, 3);
        assert!(!completion.cached);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_second_complete_rejected_without_running_factory() {
        let calls = Arc::new(Mutex::new(0));
        let mut registry = Registry::new();
        registry.create_loading("a.js".into(), slot(0)).unwrap();

        let counter = |calls: &Arc<Mutex<i32>>| -> Factory<i32> {
            let calls = Arc::clone(calls);
            Box::new(move |_| {
                *calls.lock() += 1;
                10
            })
        };

        registry.complete(&"a.js".into(), vec![], counter(&calls)).unwrap();
        let err = registry.complete(&"a.js".into(), vec![], counter(&calls)).unwrap_err();

        assert!(matches!(err, LoadError::AlreadyLoaded(_)));
        assert_eq!(*calls.lock(), 1);
        assert_eq!(registry.exports("a.js"), Some(&10));
    }

    #[test]
    fn test_loading_ids_and_dependencies() {
        let mut registry = Registry::new();
        registry.create_loading("b.js".into(), slot(0)).unwrap();
        registry.create_loading("a.js".into(), slot(0)).unwrap();
        registry.set_dependencies(&"a.js".into(), &["c.js".into()]);

        assert_eq!(registry.loading_ids(), vec![ModuleId::from("a.js"), ModuleId::from("b.js")]);
        assert_eq!(registry.get("a.js").unwrap().dependencies(), &[ModuleId::from("c.js")]);
    }
}
