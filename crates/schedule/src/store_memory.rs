//! In-memory store for tests and throwaway sessions.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    store::ScheduleStore,
    types::{RunRecord, ScheduleTask},
};

/// Tasks kept in insertion order. Nothing is persisted.
#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<ScheduleTask>>,
    runs: Mutex<HashMap<String, Vec<RunRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<ScheduleTask>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            runs: Mutex::default(),
        }
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn load_tasks(&self) -> Result<Vec<ScheduleTask>> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tasks.clone())
    }

    async fn save_task(&self, task: &ScheduleTask) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task.clone(),
            None => tasks.push(task.clone()),
        }
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Err(Error::task_not_found(id));
        }
        Ok(())
    }

    async fn update_task(&self, task: &ScheduleTask) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| Error::task_not_found(&task.id))?;
        *slot = task.clone();
        Ok(())
    }

    async fn replace_all(&self, tasks: &[ScheduleTask]) -> Result<()> {
        let mut stored = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        *stored = tasks.to_vec();
        Ok(())
    }

    async fn append_run(&self, task_id: &str, run: &RunRecord) -> Result<()> {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.entry(task_id.to_string())
            .or_default()
            .push(run.clone());
        Ok(())
    }

    async fn get_runs(&self, task_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let records = runs.get(task_id).cloned().unwrap_or_default();
        let start = records.len().saturating_sub(limit);
        Ok(records[start..].to_vec())
    }
}
