// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey-loader - host for the Spacey AMD module loader
//!
//! Modules are described on the command line as `id[:deps][=factory]`
//! specs and served from memory with an optional fetch latency.
//!
//! ## Features
//!
//! - One-shot loading of an entry module with `run`
//! - Interactive REPL with history
//! - Optional load trace

mod manifest;
mod repl;
mod session;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_amd::{CycleCheck, LoadEvent, LoaderConfig, VERSION};
use std::process::ExitCode;
use std::time::Duration;

use crate::manifest::ModuleSpec;
use crate::session::Session;

#[derive(Parser)]
#[command(
    name = "spacey-loader",
    about = "Asynchronous AMD-style module loader powered by Spacey",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load an entry module and print its exports
    Run {
        /// Module spec `id[:dep1,dep2][=factory]`, repeatable
        #[arg(short = 'm', long = "module", value_name = "SPEC")]
        modules: Vec<String>,

        /// Module to import
        #[arg(short = 'e', long = "entry")]
        entry: String,

        #[command(flatten)]
        options: LoaderOptions,
    },

    /// Start the interactive REPL
    Repl {
        #[command(flatten)]
        options: LoaderOptions,
    },
}

#[derive(Args, Clone)]
struct LoaderOptions {
    /// Script that spec ids are relative to
    #[arg(long, default_value = "app/index.js")]
    base: String,

    /// Delay before each module is delivered
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Print the load trace
    #[arg(long)]
    trace: bool,

    /// Cycle detection: direct or transitive
    #[arg(long)]
    cycle_check: Option<CycleCheck>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            base: "app/index.js".to_string(),
            latency_ms: 0,
            trace: false,
            cycle_check: None,
        }
    }
}

impl LoaderOptions {
    /// Environment configuration with command line overrides
    fn config(&self) -> LoaderConfig {
        let mut config = LoaderConfig::from_env();
        if let Some(check) = self.cycle_check {
            config.cycle_check = check;
        }
        config.trace |= self.trace;
        config
    }

    fn session(&self) -> Session {
        Session::new(
            self.config(),
            self.base.as_str(),
            Duration::from_millis(self.latency_ms),
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_amd=debug,spacey_loader=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_amd=warn")
            .init();
    }

    let command = cli.command.unwrap_or(Command::Repl {
        options: LoaderOptions::default(),
    });

    let result = match command {
        Command::Run {
            modules,
            entry,
            options,
        } => run(&modules, &entry, &options).await,
        Command::Repl { options } => repl::run(options.session()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Register `modules`, import `entry` and print its exports
async fn run(modules: &[String], entry: &str, options: &LoaderOptions) -> anyhow::Result<()> {
    let mut session = options.session();
    for text in modules {
        let spec: ModuleSpec = text.parse()?;
        session
            .add(spec)
            .with_context(|| format!("cannot register '{}'", text))?;
    }

    let result = session.require(entry).await;
    if session.config().trace {
        print_trace(session.loader().events());
    }

    let exports = result?;
    println!("{}", serde_json::to_string_pretty(&exports)?);
    Ok(())
}

/// Print the load trace, one event per line
pub(crate) fn print_trace(events: &[LoadEvent]) {
    for event in events {
        let line = match event {
            LoadEvent::FetchRequested { module } => {
                format!("{:10} {}", "fetch".cyan(), module)
            }
            LoadEvent::Declared {
                module,
                dependencies,
            } => {
                let deps: Vec<&str> = dependencies.iter().map(|d| d.as_str()).collect();
                format!("{:10} {} [{}]", "declare".blue(), module, deps.join(", "))
            }
            LoadEvent::Queued { module } => format!("{:10} {}", "queue".dimmed(), module),
            LoadEvent::Deferred { module } => format!("{:10} {}", "defer".yellow(), module),
            LoadEvent::Loaded { module } => format!("{:10} {}", "loaded".green(), module),
            LoadEvent::Evaluated { module } => {
                format!("{:10} {}", "evaluated".green(), module)
            }
            LoadEvent::FetchFailed { module, reason } => {
                format!("{:10} {} ({})", "failed".red(), module, reason)
            }
        };
        eprintln!("  {}", line);
    }
}
