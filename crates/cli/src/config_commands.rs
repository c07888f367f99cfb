use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use cartograph_config::{Diagnostic, Severity};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check,
    /// Print the effective configuration as JSON.
    Show,
}

pub fn handle_config(action: &ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => check(explicit),
        ConfigAction::Show => show(explicit),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn load(explicit: Option<&Path>) -> Result<cartograph_config::CartographConfig> {
    match explicit {
        Some(path) => {
            eprintln!("Checking {}\n", path.display());
            cartograph_config::load_config(path)
        },
        None => {
            eprintln!("Checking discovered config (defaults when none is found).\n");
            Ok(cartograph_config::discover_and_load())
        },
    }
}

fn check(explicit: Option<&Path>) -> Result<()> {
    let config = load(explicit)?;
    let diagnostics = config.validate();

    for d in &diagnostics {
        print_diagnostic(d);
    }

    let errors = count(&diagnostics, Severity::Error);
    let warnings = count(&diagnostics, Severity::Warning);

    if !diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn print_diagnostic(d: &Diagnostic) {
    let (color, label) = match d.severity {
        Severity::Error => (RED, "error"),
        Severity::Warning => (YELLOW, "warning"),
    };

    if d.path.is_empty() {
        eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
    } else {
        eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
    }
}

fn count(diagnostics: &[Diagnostic], severity: Severity) -> usize {
    diagnostics.iter().filter(|d| d.severity == severity).count()
}

fn show(explicit: Option<&Path>) -> Result<()> {
    let config = load(explicit)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
