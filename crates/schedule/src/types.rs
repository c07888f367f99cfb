//! Core data types for schedule tasks.
//!
//! All timestamps are epoch milliseconds.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    /// Fire once at `runAt`.
    Once,
    /// Every day at `runAt`'s time of day.
    Daily,
    /// Every week on `runAt`'s weekday and time of day.
    Weekly,
    /// Every `intervalMinutes`.
    Interval,
}

impl ScheduleType {
    pub fn requires_anchor(self) -> bool {
        !matches!(self, Self::Interval)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTask {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub schedule_type: ScheduleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
    /// IANA zone for daily/weekly computation. UTC when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// `None` is unlimited.
    #[serde(default)]
    pub max_runs: Option<u32>,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub next_run_at: Option<u64>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl ScheduleTask {
    pub fn runs_exhausted(&self) -> bool {
        self.max_runs.is_some_and(|max| self.run_count >= max)
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.enabled && self.next_run_at.is_some_and(|at| at <= now_ms)
    }

    /// Turn the task off for good until it is updated again.
    pub(crate) fn disable(&mut self) {
        self.enabled = false;
        self.next_run_at = None;
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskCreate {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub run_at: Option<u64>,
    #[serde(default)]
    pub interval_minutes: Option<u64>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// `0` means unlimited.
    #[serde(default)]
    pub max_runs: Option<u32>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Patch for updating an existing task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_type: Option<ScheduleType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// `Some(0)` clears the limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Outcome reported by whoever executed a due task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub status: RunStatus,
    /// Defaults to the service clock.
    #[serde(default)]
    pub finished_at: Option<u64>,
    #[serde(default)]
    pub started_at: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunResult {
    pub fn ok(finished_at: u64) -> Self {
        Self {
            status: RunStatus::Ok,
            finished_at: Some(finished_at),
            started_at: None,
            error: None,
        }
    }

    pub fn error(finished_at: u64, message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            finished_at: Some(finished_at),
            started_at: None,
            error: Some(message.into()),
        }
    }
}

/// One line of a task's run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    pub finished_at: u64,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Run count after this run.
    pub run_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Upsert by id, keeping tasks not in the import.
    #[default]
    Merge,
    /// Substitute the whole collection.
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    pub task_count: usize,
    pub enabled_count: usize,
    pub due_count: usize,
    pub next_run_at: Option<u64>,
}
