// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module specs written on the command line and in the REPL
//!
//! A spec has the form `id[:dep1,dep2][=factory]`, e.g.
//! `app/y:./x=sum+1` or `app/config={"debug":true}`.

use anyhow::{Context, bail};
use serde_json::{Number, Value};
use spacey_amd::{DefineArg, ModuleSource};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What a spec'd module's factory computes from its dependency exports
#[derive(Debug, Clone, PartialEq)]
pub enum FactoryKind {
    /// The dependency exports as an array
    List,
    /// Numeric sum of the dependency exports plus an offset
    Sum(f64),
    /// A fixed JSON value
    Const(Value),
}

impl FactoryKind {
    /// Run the factory
    pub fn evaluate(&self, deps: Vec<Value>) -> Value {
        match self {
            Self::List => Value::Array(deps),
            Self::Sum(offset) => {
                let total = deps.iter().filter_map(Value::as_f64).sum::<f64>() + offset;
                number(total)
            }
            Self::Const(value) => value.clone(),
        }
    }
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Sum(offset) if *offset == 0.0 => write!(f, "sum"),
            Self::Sum(offset) if *offset > 0.0 => write!(f, "sum+{}", offset),
            Self::Sum(offset) => write!(f, "sum{}", offset),
            Self::Const(value) => write!(f, "{}", value),
        }
    }
}

impl FromStr for FactoryKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if s == "list" {
            return Ok(Self::List);
        }

        if let Some(rest) = s.strip_prefix("sum") {
            if rest.is_empty() {
                return Ok(Self::Sum(0.0));
            }
            let offset: f64 = rest
                .strip_prefix('+')
                .unwrap_or(rest)
                .parse()
                .with_context(|| format!("invalid sum offset '{}'", rest))?;
            return Ok(Self::Sum(offset));
        }

        let value =
            serde_json::from_str(s).with_context(|| format!("invalid factory '{}'", s))?;
        Ok(Self::Const(value))
    }
}

/// Integral results stay integers so `1 + 2` prints as `3`, not `3.0`
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

/// One module parsed from `id[:deps][=factory]`
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSpec {
    /// Identifier as written, resolved against the host's base
    pub id: String,
    /// Dependency identifiers as written, relative to `id`
    pub dependencies: Vec<String>,
    /// Factory to run once the dependencies are loaded
    pub factory: FactoryKind,
}

impl ModuleSpec {
    /// The `define()` arguments this module's script would pass.
    ///
    /// The explicit id is left out; the fetched id names the module.
    pub fn to_args(&self) -> Vec<DefineArg<Value>> {
        let kind = self.factory.clone();
        let factory = DefineArg::factory(move |deps: Vec<Value>| kind.evaluate(deps));

        if self.dependencies.is_empty() {
            vec![factory]
        } else {
            vec![DefineArg::deps(self.dependencies.clone()), factory]
        }
    }

    /// A fetcher source for this module
    pub fn to_source(&self, latency: Duration) -> ModuleSource<Value> {
        ModuleSource::new(self.to_args()).with_latency(latency)
    }
}

impl fmt::Display for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.dependencies.is_empty() {
            write!(f, ":{}", self.dependencies.join(","))?;
        }
        write!(f, "={}", self.factory)
    }
}

impl FromStr for ModuleSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (head, factory) = match s.split_once('=') {
            Some((head, factory)) => (head, Some(factory)),
            None => (s, None),
        };

        // a `://` belongs to a URL id, not the dependency separator
        let separator = head
            .match_indices(':')
            .map(|(i, _)| i)
            .find(|&i| !head[i + 1..].starts_with("//"));
        let (id, dependencies) = match separator {
            Some(i) => (&head[..i], &head[i + 1..]),
            None => (head, ""),
        };

        let id = id.trim();
        if id.is_empty() {
            bail!("module spec '{}' has no id", s);
        }

        let dependencies: Vec<String> = dependencies
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from)
            .collect();

        let factory = match factory {
            Some(factory) => factory
                .parse()
                .with_context(|| format!("in module spec '{}'", s))?,
            None if dependencies.is_empty() => FactoryKind::Const(Value::Null),
            None => FactoryKind::List,
        };

        Ok(Self {
            id: id.to_string(),
            dependencies,
            factory,
        })
    }
}
