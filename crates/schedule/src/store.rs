//! Persistence trait for schedule tasks.

use async_trait::async_trait;

use crate::{
    Result,
    types::{RunRecord, ScheduleTask},
};

/// Persistence backend for one task collection and its run history.
///
/// Implementations keep tasks in insertion order.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn load_tasks(&self) -> Result<Vec<ScheduleTask>>;
    /// Insert, or replace a task with the same id.
    async fn save_task(&self, task: &ScheduleTask) -> Result<()>;
    async fn delete_task(&self, id: &str) -> Result<()>;
    async fn update_task(&self, task: &ScheduleTask) -> Result<()>;
    /// Swap the whole collection in one write.
    async fn replace_all(&self, tasks: &[ScheduleTask]) -> Result<()>;
    async fn append_run(&self, task_id: &str, run: &RunRecord) -> Result<()>;
    /// Most recent `limit` runs, oldest first.
    async fn get_runs(&self, task_id: &str, limit: usize) -> Result<Vec<RunRecord>>;
}
