//! Config schema types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartographConfig {
    pub matcher: MatcherConfig,
    pub fetch: FetchConfig,
    pub bus: BusConfig,
    pub workflow: WorkflowConfig,
    pub schedule: ScheduleConfig,
    pub browser: BrowserConfig,
    /// Container library JSON files loaded at startup.
    pub libraries: Vec<PathBuf>,
}

/// How the matcher chooses among several matching root containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootSelection {
    /// Keep only the matched root with the highest `priority`; ties go to
    /// the root declared first.
    #[default]
    HighestPriority,
    /// Keep every matched root.
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub max_depth: usize,
    pub max_children: usize,
    pub root_selection: RootSelection,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_children: 20,
            root_selection: RootSelection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_depth: usize,
    pub max_children: usize,
    /// Ceiling applied to any requested depth.
    pub depth_cap: usize,
    /// Ceiling applied to any requested breadth.
    pub children_cap: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_children: 50,
            depth_cap: 10,
            children_cap: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub history_limit: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { history_limit: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Evaluation log entries kept per rule.
    pub evaluation_limit: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            evaluation_limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Root for schedule files. `CARTOGRAPH_DATA_DIR` takes precedence.
    pub data_dir: Option<PathBuf>,
    /// Task collection name; one JSON file per collection.
    pub collection: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            collection: "default".into(),
        }
    }
}

/// Chromium launch settings for live sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Auto-detected when unset.
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    /// Per-command CDP timeout, including navigation.
    pub navigation_timeout_ms: u64,
    pub user_agent: Option<String>,
    pub chrome_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            device_scale_factor: 1.0,
            navigation_timeout_ms: 30_000,
            user_agent: None,
            chrome_args: Vec::new(),
        }
    }
}
