//! Configuration loading, env substitution, and data directory resolution.
//!
//! Config files: `cartograph.toml`, `cartograph.yaml`, or `cartograph.json`
//! Searched in `./` then `~/.config/cartograph/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        DATA_DIR_ENV, config_dir, data_dir, discover_and_load, load_config, resolve_data_dir,
    },
    schema::{
        BrowserConfig, BusConfig, CartographConfig, FetchConfig, MatcherConfig, RootSelection, ScheduleConfig,
        WorkflowConfig,
    },
    validate::{Diagnostic, Severity},
};
