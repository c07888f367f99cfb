//! CLI subcommands for container library files.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    cartograph_containers::{ContainerLibrary, LibraryCatalog},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum LibraryAction {
    /// Load library files and report their structure. Fails on cycles,
    /// unknown children or malformed selectors.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

pub fn handle_library(action: &LibraryAction) -> Result<()> {
    match action {
        LibraryAction::Check { files } => check(files),
    }
}

fn check(files: &[PathBuf]) -> Result<()> {
    for file in files {
        let catalog = load_file(file)?;
        println!("{}", file.display());
        for library in catalog.libraries() {
            println!("{}", describe(library));
        }
    }
    Ok(())
}

fn load_file(path: &Path) -> Result<LibraryCatalog> {
    LibraryCatalog::load_files(&[path]).with_context(|| format!("invalid library {}", path.display()))
}

fn describe(library: &ContainerLibrary) -> String {
    let roots: Vec<&str> = library.roots().map(|c| c.id.as_str()).collect();
    let operations: usize = library.containers().iter().map(|c| c.operations.len()).sum();
    format!(
        "  {}: {} container(s), {} operation(s)\n    domains: {}\n    roots:   {}",
        library.name(),
        library.len(),
        operations,
        display_list(library.domains()),
        display_list(&roots),
    )
}

fn display_list<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
    }
}
