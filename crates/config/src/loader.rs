use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::CartographConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "cartograph.toml",
    "cartograph.yaml",
    "cartograph.yml",
    "cartograph.json",
];

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CARTOGRAPH_DATA_DIR";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<CartographConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./cartograph.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/cartograph/cartograph.{toml,yaml,yml,json}` (user-global)
///
/// Returns `CartographConfig::default()` if no config file is found.
pub fn discover_and_load() -> CartographConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    CartographConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/cartograph/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "cartograph").map(|d| d.config_dir().to_path_buf())
}

/// Resolve the data directory for `config`.
///
/// `CARTOGRAPH_DATA_DIR` wins over `schedule.data_dir`, which wins over the
/// platform data directory. Falls back to `./.cartograph`.
pub fn data_dir(config: &CartographConfig) -> PathBuf {
    resolve_data_dir(
        std::env::var_os(DATA_DIR_ENV).map(PathBuf::from),
        config,
    )
}

/// [`data_dir`] with the environment value passed in explicitly.
pub fn resolve_data_dir(env_override: Option<PathBuf>, config: &CartographConfig) -> PathBuf {
    if let Some(dir) = env_override.filter(|p| !p.as_os_str().is_empty()) {
        return dir;
    }
    if let Some(dir) = &config.schedule.data_dir {
        return dir.clone();
    }
    directories::ProjectDirs::from("", "", "cartograph")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".cartograph"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CartographConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
