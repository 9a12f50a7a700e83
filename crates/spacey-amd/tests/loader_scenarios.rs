// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end loading scenarios driven through the tokio runtime

use parking_lot::Mutex;
use spacey_amd::{
    CycleCheck, DefineArg, LoadError, LoadEvent, Loader, LoaderConfig, MemoryFetcher, ModuleId,
    ModuleSource, ModuleStatus,
};
use std::sync::Arc;
use std::time::Duration;

type Calls = Arc<Mutex<Vec<(String, Vec<i64>)>>>;

/// Factory arg that records its invocation and returns `f(deps)`
fn counted(calls: &Calls, name: &str, f: fn(&[i64]) -> i64) -> DefineArg<i64> {
    let calls = Arc::clone(calls);
    let name = name.to_string();
    DefineArg::factory(move |deps: Vec<i64>| {
        let value = f(&deps);
        calls.lock().push((name, deps));
        value
    })
}

fn calls_to(calls: &Calls, name: &str) -> Vec<Vec<i64>> {
    calls
        .lock()
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, deps)| deps.clone())
        .collect()
}

fn traced() -> LoaderConfig {
    LoaderConfig {
        trace: true,
        ..LoaderConfig::default()
    }
}

#[tokio::test]
async fn test_root_x_y_scenario() {
    let calls = Calls::default();
    let fetcher = Arc::new(MemoryFetcher::<i64>::new());
    fetcher.insert(
        "app/x.js",
        ModuleSource::new(vec![counted(&calls, "x", |_| 1)]),
    );
    // y arrives after x so its dependency is already cached
    fetcher.insert(
        "app/y.js",
        ModuleSource::new(vec![
            DefineArg::deps(["./x"]),
            counted(&calls, "y", |deps| deps[0] + 1),
        ])
        .with_latency(Duration::from_millis(20)),
    );

    let mut loader = Loader::new(traced(), fetcher.clone());
    let root = ModuleId::from("app/index.js");
    loader
        .define(
            &root,
            vec![DefineArg::deps(["x", "y"]), counted(&calls, "root", |deps| deps.iter().sum())],
        )
        .unwrap();

    loader.run_until_idle().await.unwrap();

    assert_eq!(calls_to(&calls, "x"), vec![Vec::<i64>::new()]);
    assert_eq!(calls_to(&calls, "y"), vec![vec![1]]);
    assert_eq!(calls_to(&calls, "root"), vec![vec![1, 2]]);
    assert_eq!(fetcher.request_count("app/x.js"), 1);
    assert_eq!(fetcher.request_count("app/y.js"), 1);

    assert_eq!(loader.exports("app/x.js"), Some(&1));
    assert_eq!(loader.exports("app/y.js"), Some(&2));
    assert_eq!(loader.status("app/index.js"), None);
    assert!(loader.events().contains(&LoadEvent::Deferred {
        module: "app/x.js".into()
    }));
    assert!(loader.events().contains(&LoadEvent::Evaluated {
        module: "app/index.js".into()
    }));
}

#[tokio::test]
async fn test_import_returns_exports() {
    let fetcher = Arc::new(MemoryFetcher::<i64>::new().with_latency(Duration::from_millis(1)));
    fetcher.insert("lib/a.js", ModuleSource::new(vec![DefineArg::factory(|_| 20)]));
    fetcher.insert(
        "lib/b.js",
        ModuleSource::new(vec![
            DefineArg::id("./b"),
            DefineArg::deps(["./a", "./a"]),
            DefineArg::factory(|deps: Vec<i64>| deps[0] + deps[1] + 2),
        ]),
    );

    let mut loader = Loader::new(LoaderConfig::default(), fetcher.clone());
    assert_eq!(loader.import("lib/b.js".into()).await.unwrap(), 42);

    // second import is served from the registry
    assert_eq!(loader.import("lib/b.js".into()).await.unwrap(), 42);
    assert_eq!(fetcher.requests().len(), 2);
    assert!(loader.events().is_empty());
}

#[tokio::test]
async fn test_missing_module_is_fetch_error() {
    let fetcher = Arc::new(MemoryFetcher::<i64>::new());
    fetcher.insert(
        "app/main.js",
        ModuleSource::new(vec![DefineArg::deps(["./missing"]), DefineArg::factory(|_| 0)]),
    );

    let mut loader: Loader<i64> = Loader::new(LoaderConfig::default(), fetcher);
    match loader.import("app/main.js".into()).await {
        Err(LoadError::Fetch { module, .. }) => assert_eq!(module, "app/missing.js"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(loader.status("app/main.js"), Some(ModuleStatus::Loading));
}

#[tokio::test]
async fn test_three_module_cycle_stalls_under_direct_check() {
    let fetcher = Arc::new(MemoryFetcher::<i64>::new());
    for (id, dep) in [("a.js", "b"), ("b.js", "c"), ("c.js", "a")] {
        fetcher.insert(
            id,
            ModuleSource::new(vec![DefineArg::deps([dep]), DefineArg::factory(|_| 0)]),
        );
    }

    let mut loader: Loader<i64> = Loader::new(LoaderConfig::default(), fetcher);
    match loader.import("a.js".into()).await {
        Err(LoadError::Stalled { module, waiting_on }) => {
            assert_eq!(module, "a.js");
            assert_eq!(
                waiting_on,
                vec![
                    ModuleId::from("a.js"),
                    ModuleId::from("b.js"),
                    ModuleId::from("c.js"),
                ]
            );
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_three_module_cycle_rejected_under_transitive_check() {
    let fetcher = Arc::new(MemoryFetcher::<i64>::new());
    for (id, dep) in [("a.js", "b"), ("b.js", "c"), ("c.js", "a")] {
        fetcher.insert(
            id,
            ModuleSource::new(vec![DefineArg::deps([dep]), DefineArg::factory(|_| 0)]),
        );
    }

    let config = LoaderConfig {
        cycle_check: CycleCheck::Transitive,
        ..LoaderConfig::default()
    };
    let mut loader: Loader<i64> = Loader::new(config, fetcher);
    match loader.import("a.js".into()).await {
        Err(LoadError::CyclePath { path }) => {
            assert_eq!(path.first(), Some(&ModuleId::from("c.js")));
            assert_eq!(path.len(), 4);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_direct_cycle_between_fetched_modules() {
    let fetcher = Arc::new(MemoryFetcher::<i64>::new());
    fetcher.insert(
        "a.js",
        ModuleSource::new(vec![DefineArg::deps(["b"]), DefineArg::factory(|_| 0)]),
    );
    fetcher.insert(
        "b.js",
        ModuleSource::new(vec![DefineArg::deps(["a"]), DefineArg::factory(|_| 0)]),
    );

    let mut loader: Loader<i64> = Loader::new(LoaderConfig::default(), fetcher.clone());
    let err = loader.import("a.js".into()).await.unwrap_err();
    assert!(matches!(err, LoadError::Cycle { .. }));
    assert!(err.to_string().contains("a.js"));
    assert_eq!(fetcher.requests(), vec![ModuleId::from("a.js"), ModuleId::from("b.js")]);
}

#[tokio::test]
async fn test_wide_fan_out_keeps_declaration_order() {
    let fetcher = Arc::new(MemoryFetcher::<i64>::new());
    let names: Vec<String> = (0..8).map(|i| format!("leaf{}", i)).collect();
    for (i, name) in names.iter().enumerate() {
        // later leaves arrive first
        let latency = Duration::from_millis(2 * (8 - i as u64));
        fetcher.insert(
            format!("{}.js", name),
            ModuleSource::new(vec![DefineArg::factory(move |_| i as i64)]).with_latency(latency),
        );
    }

    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    let mut loader = Loader::new(LoaderConfig::default(), fetcher);
    loader
        .define(
            &ModuleId::from("main.js"),
            vec![
                DefineArg::deps(names.clone()),
                DefineArg::factory(move |deps: Vec<i64>| {
                    *slot.lock() = Some(deps.clone());
                    deps.len() as i64
                }),
            ],
        )
        .unwrap();

    loader.run_until_idle().await.unwrap();
    assert_eq!(*seen.lock(), Some((0..8).collect::<Vec<i64>>()));
}
