// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL for registering module specs and requiring them.

use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Config, Editor, Helper};
use serde_json::Value;
use spacey_amd::{LoadError, ModuleStatus};
use std::borrow::Cow;
use std::path::PathBuf;

use crate::manifest::ModuleSpec;
use crate::session::Session;

/// REPL configuration constants
const HISTORY_FILE: &str = ".spacey_loader_history";
const MAX_HISTORY_SIZE: usize = 1000;

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Module,
    Require,
    Status,
    Trace,
    Reset,
    Help,
    Exit,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim();
        let rest = input.strip_prefix('.')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let command = match cmd.as_str() {
            "module" | "m" => ReplCommand::Module,
            "require" | "r" => ReplCommand::Require,
            "status" | "s" => ReplCommand::Status,
            "trace" | "t" => ReplCommand::Trace,
            "reset" => ReplCommand::Reset,
            "help" | "h" | "?" => ReplCommand::Help,
            "exit" | "quit" | "q" => ReplCommand::Exit,
            _ => return None,
        };
        Some((command, arg))
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".module <spec>", "Register a module, e.g. y:./x=sum+1"),
            (".require <id>", "Load a module and print its exports"),
            (".status", "Show registered and loaded modules"),
            (".trace [on|off]", "Show the load trace, or toggle it and reset"),
            (".reset", "Forget loaded modules, keep registered specs"),
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
        ]
    }
}

/// Completes command names and registered module ids
#[derive(Default)]
struct LoaderHelper {
    words: Vec<String>,
}

impl LoaderHelper {
    fn new() -> Self {
        let words = ReplCommand::all_commands()
            .iter()
            .filter_map(|(usage, _)| usage.split_whitespace().next())
            .map(String::from)
            .collect();
        Self { words }
    }

    fn add_word(&mut self, word: &str) {
        if !self.words.iter().any(|w| w == word) {
            self.words.push(word.to_string());
        }
    }

    fn current_word(line: &str) -> (usize, &str) {
        let start = line.rfind(char::is_whitespace).map(|i| i + 1).unwrap_or(0);
        (start, &line[start..])
    }
}

impl Completer for LoaderHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (_, word) = Self::current_word(&line[..pos]);
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches = self
            .words
            .iter()
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for LoaderHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() || !line.starts_with('.') || line.contains(' ') {
            return None;
        }

        ReplCommand::all_commands()
            .iter()
            .map(|(usage, _)| *usage)
            .find(|usage| usage.starts_with(line) && usage.len() > line.len())
            .map(|usage| (&usage[line.len()..]).dimmed().to_string())
    }
}

impl Highlighter for LoaderHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if !line.starts_with('.') {
            return Cow::Borrowed(line);
        }

        match line.split_once(' ') {
            Some((cmd, rest)) => Cow::Owned(format!("{} {}", cmd.magenta(), rest)),
            None => Cow::Owned(line.magenta().to_string()),
        }
    }

    fn highlight_char(&self, line: &str, _pos: usize, _forced: bool) -> bool {
        line.starts_with('.')
    }
}

impl Validator for LoaderHelper {}

impl Helper for LoaderHelper {}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

/// The interactive loader REPL
pub struct Repl {
    session: Session,
    editor: Editor<LoaderHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a new REPL driving `session`
    pub fn new(session: Session) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(LoaderHelper::new()));

        let history_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HISTORY_FILE);

        // A missing history file is fine on first run
        let _ = editor.load_history(&history_path);

        Ok(Self {
            session,
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub async fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "amd>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match ReplCommand::parse(trimmed) {
                        Some((cmd, arg)) => match self.execute_command(cmd, arg).await {
                            CommandResult::Continue => {}
                            CommandResult::Exit => break,
                        },
                        None if trimmed.starts_with('.') => {
                            eprintln!(
                                "{}: unknown command '{}', try {}",
                                "Error".red().bold(),
                                trimmed.cyan(),
                                ".help".cyan()
                            );
                        }
                        // a bare id is a require
                        None => self.require(trimmed).await,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        if let Err(e) = self.editor.save_history(&self.history_path) {
            tracing::debug!("could not save history to {}: {}", self.history_path.display(), e);
        }
        Ok(())
    }

    fn print_banner(&self) {
        println!(
            "{} {}",
            "spacey-loader".cyan().bold(),
            spacey_amd::VERSION.yellow()
        );
        println!("Type {} for help, {} to exit", ".help".green(), ".exit".green());
        println!();
    }

    async fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Module => match arg {
                Some(spec) => self.add_module(spec),
                None => missing_argument(".module", "requires a module spec"),
            },
            ReplCommand::Require => match arg {
                Some(id) => self.require(id).await,
                None => missing_argument(".require", "requires a module id"),
            },
            ReplCommand::Status => self.print_status(),
            ReplCommand::Trace => self.trace(arg),
            ReplCommand::Reset => {
                self.session.reset();
                println!("{}", "Loader reset".dimmed());
            }
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
        }
        CommandResult::Continue
    }

    fn add_module(&mut self, text: &str) {
        let spec: ModuleSpec = match text.parse() {
            Ok(spec) => spec,
            Err(e) => {
                eprintln!("{}: {:#}", "Error".red().bold(), e);
                return;
            }
        };

        let display = spec.to_string();
        match self.session.add(spec) {
            Ok(id) => {
                if let Some(helper) = self.editor.helper_mut() {
                    helper.add_word(id.as_str());
                }
                println!("{} {} {}", "registered".green(), id, display.dimmed());
            }
            Err(e) => print_load_error(&e),
        }
    }

    async fn require(&mut self, raw: &str) {
        match self.session.require(raw).await {
            Ok(exports) => println!("{}", format_value(&exports)),
            Err(e) => print_load_error(&e),
        }
    }

    fn trace(&mut self, arg: Option<&str>) {
        match arg {
            None if !self.session.config().trace => {
                println!("{} {}", "Tracing is off, enable it with".dimmed(), ".trace on".cyan());
            }
            None => crate::print_trace(self.session.loader().events()),
            Some("on") | Some("off") => {
                self.session.set_trace(arg == Some("on"));
                self.session.reset();
                println!("{} {}", "Load trace".dimmed(), arg.unwrap_or_default().yellow());
            }
            Some(other) => {
                eprintln!("{}: expected on or off, got '{}'", "Error".red().bold(), other);
            }
        }
    }

    fn print_status(&self) {
        let loader = self.session.loader();
        let registry = loader.registry();

        println!();
        println!("{}", "Modules:".white().bold());
        if registry.is_empty() && self.session.specs().is_empty() {
            println!("  {}", "(none)".dimmed());
        }

        for id in registry.ids() {
            let status = match registry.status(id.as_str()) {
                Some(ModuleStatus::Loaded) => "loaded".green().to_string(),
                _ => "loading".yellow().to_string(),
            };
            let exports = registry
                .exports(id.as_str())
                .map(format_value)
                .unwrap_or_default();
            println!("  {:32} {:8} {}", id.as_str(), status, exports);
        }

        for id in self.session.specs().keys() {
            if !registry.contains(id.as_str()) {
                println!("  {:32} {}", id.as_str(), "registered".dimmed());
            }
        }

        println!(
            "{} {} turns, {} declared, cycle check {}",
            "Loader:".white().bold(),
            loader.turns(),
            loader.graph().len(),
            loader.graph().cycle_check().yellow()
        );

        let in_flight = loader.in_flight();
        if !in_flight.is_empty() {
            let ids: Vec<&str> = in_flight.iter().map(|id| id.as_str()).collect();
            println!("{} {}", "In flight:".white().bold(), ids.join(", "));
        }
        println!();
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();

        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:18} {}", cmd.cyan(), desc.dimmed());
        }

        println!();
        println!("{}", "Module specs:".white().bold());
        println!();
        println!("  {:18} {}", "id[:deps][=fn]".cyan(), "deps are comma separated".dimmed());
        println!("  {:18} {}", "=list".yellow(), "array of dependency exports".dimmed());
        println!("  {:18} {}", "=sum, =sum+N".yellow(), "numeric sum plus N".dimmed());
        println!("  {:18} {}", "=<json>".yellow(), "constant value".dimmed());
        println!();
    }
}

/// Start the REPL on `session`
pub async fn run(session: Session) -> anyhow::Result<()> {
    let mut repl = Repl::new(session)?;
    repl.run().await?;
    Ok(())
}

fn missing_argument(cmd: &str, what: &str) {
    eprintln!("{}: {} {}", "Error".red().bold(), cmd.cyan(), what.dimmed());
}

/// Format an exports value for display with coloring
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".blue().to_string(),
        Value::Bool(b) => b.to_string().yellow().to_string(),
        Value::Number(n) => n.to_string().yellow().to_string(),
        Value::String(s) => format!("'{}'", s).green().to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string().cyan().to_string(),
    }
}

/// Print a load error, coloring the error kind before the first colon
fn print_load_error(error: &LoadError) {
    let error_str = error.to_string();

    if let Some(colon_pos) = error_str.find(':') {
        let (error_type, message) = error_str.split_at(colon_pos);
        eprintln!("{}{}", error_type.red().bold(), message);
    } else {
        eprintln!("{}", error_str.red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(
            ReplCommand::parse(".help"),
            Some((ReplCommand::Help, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".module  y:./x=sum+1 "),
            Some((ReplCommand::Module, Some("y:./x=sum+1")))
        ));
        assert!(matches!(
            ReplCommand::parse(".REQUIRE app/y"),
            Some((ReplCommand::Require, Some("app/y")))
        ));
        assert!(matches!(
            ReplCommand::parse(".trace"),
            Some((ReplCommand::Trace, None))
        ));
        assert!(ReplCommand::parse(".load x").is_none());
        assert!(ReplCommand::parse("app/y").is_none());
    }

    #[test]
    fn test_helper_words() {
        let mut helper = LoaderHelper::new();
        assert!(helper.words.iter().any(|w| w == ".require"));

        helper.add_word("app/x.js");
        helper.add_word("app/x.js");
        assert_eq!(helper.words.iter().filter(|w| *w == "app/x.js").count(), 1);
        assert_eq!(LoaderHelper::current_word(".require app/"), (9, "app/"));
    }
}
