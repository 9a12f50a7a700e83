// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Declared dependency edges and declaration-time cycle checks

use crate::error::{LoadError, Result};
use crate::module_system::ModuleId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// How much of the graph is checked when a module is declared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleCheck {
    /// Reject only cycles that close in two hops (A -> B -> A)
    #[default]
    Direct,
    /// Also reject longer cycles through already declared edges
    Transitive,
}

impl FromStr for CycleCheck {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "transitive" => Ok(Self::Transitive),
            other => Err(format!(
                "unknown cycle check '{}' (expected 'direct' or 'transitive')",
                other
            )),
        }
    }
}

impl fmt::Display for CycleCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Transitive => f.write_str("transitive"),
        }
    }
}

/// Edge map of every declaration seen so far, including modules that are
/// still loading.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// module -> dependencies, in declaration order
    edges: HashMap<ModuleId, Vec<ModuleId>>,
    check: CycleCheck,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new(check: CycleCheck) -> Self {
        Self {
            edges: HashMap::new(),
            check,
        }
    }

    /// Record a declaration and check it.
    ///
    /// The edges are recorded before the check, so a rejected declaration
    /// still replaces any earlier entry for `module`.
    pub fn declare(&mut self, module: &ModuleId, dependencies: &[ModuleId]) -> Result<()> {
        self.edges.insert(module.clone(), dependencies.to_vec());

        let dependents: HashSet<&ModuleId> = self.dependents_of(module).into_iter().collect();

        let mut conflicts: Vec<ModuleId> = Vec::new();
        for dep in dependencies {
            if dependents.contains(dep) && !conflicts.contains(dep) {
                conflicts.push(dep.clone());
            }
        }

        if !conflicts.is_empty() {
            return Err(LoadError::Cycle {
                module: module.clone(),
                conflicts,
            });
        }

        if self.check == CycleCheck::Transitive {
            if let Some(path) = self.find_cycle(module) {
                return Err(LoadError::CyclePath { path });
            }
        }

        Ok(())
    }

    /// Modules whose declared dependencies include `module`
    pub fn dependents_of(&self, module: &ModuleId) -> Vec<&ModuleId> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(module))
            .map(|(id, _)| id)
            .collect()
    }

    /// Declared dependencies of `module`
    pub fn dependencies_of(&self, module: &str) -> Option<&[ModuleId]> {
        self.edges.get(module).map(Vec::as_slice)
    }

    /// Number of declared modules
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether nothing has been declared
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The configured check
    pub fn cycle_check(&self) -> CycleCheck {
        self.check
    }

    /// Depth-first search from `module` along recorded edges back to itself.
    fn find_cycle(&self, module: &ModuleId) -> Option<Vec<ModuleId>> {
        let mut visited: HashSet<&ModuleId> = HashSet::new();
        let mut parent: HashMap<&ModuleId, &ModuleId> = HashMap::new();
        let mut stack: Vec<&ModuleId> = vec![module];

        while let Some(current) = stack.pop() {
            let Some(deps) = self.edges.get(current) else {
                continue;
            };

            for dep in deps {
                if dep == module {
                    let mut chain = Vec::new();
                    let mut node = current;
                    while node != module {
                        chain.push(node.clone());
                        node = *parent.get(node)?;
                    }
                    chain.reverse();

                    let mut path = vec![module.clone()];
                    path.extend(chain);
                    path.push(module.clone());
                    return Some(path);
                }

                if visited.insert(dep) {
                    parent.insert(dep, current);
                    stack.push(dep);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<ModuleId> {
        raw.iter().map(|s| ModuleId::from(*s)).collect()
    }

    #[test]
    fn test_two_party_cycle_rejected() {
        let mut graph = DependencyGraph::new(CycleCheck::Direct);
        graph.declare(&"b".into(), &ids(&["a"])).unwrap();

        let err = graph.declare(&"a".into(), &ids(&["b", "c"])).unwrap_err();
        match err {
            LoadError::Cycle { module, conflicts } => {
                assert_eq!(module, "a");
                assert_eq!(conflicts, ids(&["b"]));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut graph = DependencyGraph::default();
        assert!(matches!(
            graph.declare(&"a".into(), &ids(&["a"])),
            Err(LoadError::Cycle { .. })
        ));
    }

    #[test]
    fn test_conflicts_not_duplicated() {
        let mut graph = DependencyGraph::default();
        graph.declare(&"b".into(), &ids(&["a"])).unwrap();
        match graph.declare(&"a".into(), &ids(&["b", "b"])) {
            Err(LoadError::Cycle { conflicts, .. }) => assert_eq!(conflicts, ids(&["b"])),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_three_party_cycle_passes_direct_check() {
        let mut graph = DependencyGraph::new(CycleCheck::Direct);
        graph.declare(&"a".into(), &ids(&["b"])).unwrap();
        graph.declare(&"b".into(), &ids(&["c"])).unwrap();
        assert!(graph.declare(&"c".into(), &ids(&["a"])).is_ok());
    }

    #[test]
    fn test_three_party_cycle_rejected_transitively() {
        let mut graph = DependencyGraph::new(CycleCheck::Transitive);
        graph.declare(&"a".into(), &ids(&["b"])).unwrap();
        graph.declare(&"b".into(), &ids(&["c"])).unwrap();

        match graph.declare(&"c".into(), &ids(&["a"])) {
            Err(LoadError::CyclePath { path }) => assert_eq!(path, ids(&["c", "a", "b", "c"])),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut graph = DependencyGraph::new(CycleCheck::Transitive);
        graph.declare(&"root".into(), &ids(&["x", "y"])).unwrap();
        graph.declare(&"y".into(), &ids(&["x"])).unwrap();
        graph.declare(&"x".into(), &[]).unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_redeclaration_overwrites_edges() {
        let mut graph = DependencyGraph::default();
        graph.declare(&"b".into(), &ids(&["a"])).unwrap();
        graph.declare(&"b".into(), &[]).unwrap();
        assert!(graph.declare(&"a".into(), &ids(&["b"])).is_ok());
        assert_eq!(graph.dependencies_of("b"), Some(&[][..]));
    }

    #[test]
    fn test_parse_cycle_check() {
        assert_eq!("Transitive".parse::<CycleCheck>(), Ok(CycleCheck::Transitive));
        assert!("full".parse::<CycleCheck>().is_err());
    }
}
