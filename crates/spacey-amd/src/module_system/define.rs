// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `define()` argument handling
//!
//! A script registers a module with one of four argument shapes:
//!
//! - `define(id, [deps], factory)`
//! - `define([deps], factory)`
//! - `define(id, factory)`
//! - `define(factory)`
//!
//! The factory is always last. An explicit id must name the script that
//! is calling `define`; anonymous declarations take that script's id.

use crate::error::{LoadError, Result};
use crate::module_system::{ModuleId, PathResolver};
use std::fmt;

/// Computes a module's exports from its dependencies' exports, in
/// declaration order.
pub type Factory<V> = Box<dyn FnOnce(Vec<V>) -> V + Send + 'static>;

/// One positional argument of a `define()` call
pub enum DefineArg<V> {
    /// Module identifier, as written
    Id(String),
    /// Dependency identifiers, as written
    Dependencies(Vec<String>),
    /// Exports factory
    Factory(Factory<V>),
}

impl<V> DefineArg<V> {
    /// Module id argument
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Dependency list argument
    pub fn deps<I, S>(deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Dependencies(deps.into_iter().map(Into::into).collect())
    }

    /// Factory argument
    pub fn factory<F>(factory: F) -> Self
    where
        F: FnOnce(Vec<V>) -> V + Send + 'static,
    {
        Self::Factory(Box::new(factory))
    }
}

impl<V> fmt::Debug for DefineArg<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Self::Dependencies(deps) => f.debug_tuple("Dependencies").field(deps).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// A parsed declaration: the triple consumed by the loader
pub struct Declaration<V> {
    /// Canonical id of the declared module
    pub id: ModuleId,
    /// Canonical dependency ids, in declaration order
    pub dependencies: Vec<ModuleId>,
    /// Exports factory
    pub factory: Factory<V>,
}

impl<V> fmt::Debug for Declaration<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Parse the arguments of a `define()` call made by the script `current`
pub fn parse_define<V>(
    mut args: Vec<DefineArg<V>>,
    current: &ModuleId,
    resolver: &dyn PathResolver,
) -> Result<Declaration<V>> {
    let factory = match args.pop() {
        Some(DefineArg::Factory(factory)) => factory,
        _ => return Err(LoadError::shape("last argument must be a factory")),
    };

    if args.len() > 2 {
        return Err(LoadError::shape("define() takes at most 3 arguments"));
    }

    let mut rest = args.into_iter();
    let (explicit, raw_deps) = match (rest.next(), rest.next()) {
        (Some(DefineArg::Id(id)), Some(DefineArg::Dependencies(deps))) => (Some(id), deps),
        (Some(DefineArg::Dependencies(deps)), None) => (None, deps),
        (Some(DefineArg::Id(id)), None) => (Some(id), Vec::new()),
        (None, None) => (None, Vec::new()),
        (first, second) => {
            return Err(LoadError::shape(format!(
                "unsupported argument shape ({}, {}, factory)",
                shape_name(first.as_ref()),
                shape_name(second.as_ref())
            )));
        }
    };

    let id = match explicit {
        Some(raw) => {
            let id = resolver.resolve(&raw, current)?;
            if &id != current {
                return Err(LoadError::IdentityMismatch {
                    expected: current.clone(),
                    found: id,
                });
            }
            id
        }
        None => current.clone(),
    };

    let dependencies = raw_deps
        .iter()
        .map(|raw| resolver.resolve(raw, current))
        .collect::<Result<Vec<_>>>()?;

    Ok(Declaration {
        id,
        dependencies,
        factory,
    })
}

fn shape_name<V>(arg: Option<&DefineArg<V>>) -> &'static str {
    match arg {
        Some(DefineArg::Id(_)) => "id",
        Some(DefineArg::Dependencies(_)) => "deps",
        Some(DefineArg::Factory(_)) => "factory",
        None => "-",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_system::UrlResolver;

    fn parse(args: Vec<DefineArg<i32>>) -> Result<Declaration<i32>> {
        parse_define(args, &ModuleId::from("app/main.js"), &UrlResolver::default())
    }

    fn constant(value: i32) -> DefineArg<i32> {
        DefineArg::factory(move |_| value)
    }

    #[test]
    fn test_factory_only() {
        let decl = parse(vec![constant(1)]).unwrap();
        assert_eq!(decl.id, "app/main.js");
        assert!(decl.dependencies.is_empty());
        assert_eq!((decl.factory)(vec![]), 1);
    }

    #[test]
    fn test_deps_and_factory() {
        let decl = parse(vec![DefineArg::deps(["./a", "lib/b"]), constant(1)]).unwrap();
        assert_eq!(decl.id, "app/main.js");
        assert_eq!(
            decl.dependencies,
            vec![ModuleId::from("app/a.js"), ModuleId::from("app/lib/b.js")]
        );
    }

    #[test]
    fn test_explicit_id_matching_script() {
        let decl = parse(vec![
            DefineArg::id("./main"),
            DefineArg::deps(["a"]),
            constant(1),
        ])
        .unwrap();
        assert_eq!(decl.id, "app/main.js");
        assert_eq!(decl.dependencies, vec![ModuleId::from("app/a.js")]);

        let decl = parse(vec![DefineArg::id("main.js"), constant(2)]).unwrap();
        assert!(decl.dependencies.is_empty());
    }

    #[test]
    fn test_identity_mismatch() {
        match parse(vec![DefineArg::id("other"), constant(1)]) {
            Err(LoadError::IdentityMismatch { expected, found }) => {
                assert_eq!(expected, "app/main.js");
                assert_eq!(found, "app/other.js");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_last_argument_must_be_factory() {
        let err = parse(vec![DefineArg::deps(["a"])]).unwrap_err();
        assert!(matches!(err, LoadError::Shape(_)));
        assert!(matches!(parse(vec![]), Err(LoadError::Shape(_))));
    }

    #[test]
    fn test_too_many_arguments() {
        let err = parse(vec![
            DefineArg::id("main"),
            DefineArg::deps(["a"]),
            DefineArg::deps(["b"]),
            constant(1),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("at most 3"));
    }

    #[test]
    fn test_wrong_order_is_shape_error() {
        let err = parse(vec![
            DefineArg::deps(["a"]),
            DefineArg::id("main"),
            constant(1),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("(deps, id, factory)"));
    }

    #[test]
    fn test_unresolvable_dependency() {
        let err = parse(vec![DefineArg::deps(["/root/a"]), constant(1)]).unwrap_err();
        assert!(matches!(err, LoadError::Resolve { .. }));
    }
}
