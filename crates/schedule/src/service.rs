//! Schedule bookkeeping: CRUD, run results, due listing, import/export.
//!
//! The service owns the in-memory task list and writes through to its
//! [`ScheduleStore`] before committing any change, so a failed write leaves
//! both sides untouched.

use std::{collections::HashSet, sync::Arc};

use {
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    schedule::{initial_run, next_run_after, validate},
    store::ScheduleStore,
    types::{
        ImportMode, ImportSummary, RunRecord, RunResult, RunStatus, ScheduleStatus, ScheduleTask,
        ScheduleTaskCreate, ScheduleTaskPatch,
    },
};

/// Source of "now" in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
    tasks: RwLock<Vec<ScheduleTask>>,
    clock: Clock,
}

impl ScheduleService {
    /// Load the collection from `store` using the system clock.
    pub async fn load(store: Arc<dyn ScheduleStore>) -> Result<Self> {
        Self::with_clock(store, Arc::new(cartograph_common::now_ms)).await
    }

    pub async fn with_clock(store: Arc<dyn ScheduleStore>, clock: Clock) -> Result<Self> {
        let tasks = store.load_tasks().await?;
        debug!(count = tasks.len(), "schedule collection loaded");
        Ok(Self {
            store,
            tasks: RwLock::new(tasks),
            clock,
        })
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Add a new task. Nothing is stored when validation fails.
    pub async fn add(&self, create: ScheduleTaskCreate) -> Result<ScheduleTask> {
        let now = self.now();
        let id = create
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut task = ScheduleTask {
            id,
            name: create.name,
            schedule_type: create.schedule_type,
            run_at: create.run_at,
            interval_minutes: create.interval_minutes,
            timezone: create.timezone,
            max_runs: create.max_runs.filter(|&max| max > 0),
            run_count: 0,
            next_run_at: None,
            enabled: create.enabled,
            payload: create.payload,
            last_run_at: None,
            last_status: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        validate(&task)?;
        settle(&mut task, now, true)?;

        let mut tasks = self.tasks.write().await;
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(Error::validation(format!(
                "task '{}' already exists",
                task.id
            )));
        }
        self.store.save_task(&task).await?;
        tasks.push(task.clone());
        drop(tasks);

        info!(id = %task.id, name = %task.name, next_run_at = ?task.next_run_at, "schedule task added");
        Ok(task)
    }

    /// Apply a patch. The next run is recomputed when the schedule itself
    /// changes or the task is re-enabled.
    pub async fn update(&self, id: &str, patch: ScheduleTaskPatch) -> Result<ScheduleTask> {
        let now = self.now();
        let mut tasks = self.tasks.write().await;
        let pos = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::task_not_found(id))?;

        let mut task = tasks[pos].clone();
        let was_enabled = task.enabled;
        let reschedule = patch.schedule_type.is_some()
            || patch.run_at.is_some()
            || patch.interval_minutes.is_some()
            || patch.timezone.is_some();

        if let Some(name) = patch.name {
            task.name = name;
        }
        if let Some(schedule_type) = patch.schedule_type {
            task.schedule_type = schedule_type;
        }
        if let Some(run_at) = patch.run_at {
            task.run_at = Some(run_at);
        }
        if let Some(minutes) = patch.interval_minutes {
            task.interval_minutes = Some(minutes);
        }
        if let Some(timezone) = patch.timezone {
            task.timezone = Some(timezone).filter(|tz| !tz.trim().is_empty());
        }
        if let Some(max_runs) = patch.max_runs {
            task.max_runs = Some(max_runs).filter(|&max| max > 0);
        }
        if let Some(payload) = patch.payload {
            task.payload = payload;
        }
        if let Some(enabled) = patch.enabled {
            task.enabled = enabled;
        }
        task.updated_at = now;

        validate(&task)?;
        settle(&mut task, now, reschedule || !was_enabled)?;

        self.store.update_task(&task).await?;
        tasks[pos] = task.clone();
        drop(tasks);

        info!(id, enabled = task.enabled, next_run_at = ?task.next_run_at, "schedule task updated");
        Ok(task)
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.iter().any(|t| t.id == id) {
            return Err(Error::task_not_found(id));
        }
        self.store.delete_task(id).await?;
        tasks.retain(|t| t.id != id);
        drop(tasks);
        info!(id, "schedule task removed");
        Ok(())
    }

    /// Record the outcome of a run and advance the task.
    ///
    /// The run counts regardless of status. Once `maxRuns` is reached the
    /// task is disabled for good. A task that was already disabled only has
    /// its bookkeeping updated. Failing to append the run history is logged
    /// and does not fail the call.
    pub async fn mark_result(&self, id: &str, result: RunResult) -> Result<ScheduleTask> {
        let now = self.now();
        let finished_at = result.finished_at.unwrap_or(now);
        let mut tasks = self.tasks.write().await;
        let pos = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::task_not_found(id))?;

        let mut task = tasks[pos].clone();
        task.run_count = task.run_count.saturating_add(1);
        task.last_run_at = Some(finished_at);
        task.last_status = Some(result.status);
        task.last_error = match result.status {
            RunStatus::Ok => None,
            _ => result.error.clone(),
        };
        task.updated_at = now;

        if task.enabled {
            if task.runs_exhausted() {
                task.disable();
            } else {
                match next_run_after(&task, finished_at)? {
                    Some(next) => task.next_run_at = Some(next),
                    None => task.disable(),
                }
            }
        }

        self.store.update_task(&task).await?;
        tasks[pos] = task.clone();
        drop(tasks);

        let record = RunRecord {
            task_id: task.id.clone(),
            started_at: result.started_at,
            finished_at,
            status: result.status,
            error: result.error,
            run_count: task.run_count,
        };
        // The run is already counted; history is best effort.
        if let Err(e) = self.store.append_run(&task.id, &record).await {
            warn!(id, error = %e, "failed to append schedule run history");
        }

        info!(
            id,
            status = ?record.status,
            run_count = task.run_count,
            enabled = task.enabled,
            next_run_at = ?task.next_run_at,
            "schedule run recorded"
        );
        Ok(task)
    }

    /// Enabled tasks due at `now_ms`, earliest first, at most `limit`.
    pub async fn list_due(&self, limit: usize, now_ms: u64) -> Vec<ScheduleTask> {
        let tasks = self.tasks.read().await;
        let mut due: Vec<_> = tasks.iter().filter(|t| t.is_due(now_ms)).cloned().collect();
        due.sort_by_key(|t| t.next_run_at);
        due.truncate(limit);
        due
    }

    /// Bring in externally defined tasks.
    ///
    /// Every task is validated and normalised before anything is written.
    /// Imported tasks keep their run counters; a missing `nextRunAt` on an
    /// enabled task is computed from now.
    pub async fn import(
        &self,
        incoming: Vec<ScheduleTask>,
        mode: ImportMode,
    ) -> Result<ImportSummary> {
        let now = self.now();
        let mut seen = HashSet::new();
        let mut normalised = Vec::with_capacity(incoming.len());
        for mut task in incoming {
            if !seen.insert(task.id.clone()) {
                return Err(Error::validation(format!(
                    "duplicate task id '{}' in import",
                    task.id
                )));
            }
            task.max_runs = task.max_runs.filter(|&max| max > 0);
            validate(&task)?;
            settle(&mut task, now, false)?;
            if task.created_at == 0 {
                task.created_at = now;
            }
            task.updated_at = now;
            normalised.push(task);
        }

        let mut tasks = self.tasks.write().await;
        let mut summary = ImportSummary::default();
        let next = match mode {
            ImportMode::Merge => {
                let mut merged = tasks.clone();
                for task in normalised {
                    match merged.iter_mut().find(|t| t.id == task.id) {
                        Some(slot) => {
                            *slot = task;
                            summary.updated += 1;
                        },
                        None => {
                            merged.push(task);
                            summary.added += 1;
                        },
                    }
                }
                merged
            },
            ImportMode::Replace => {
                summary.removed = tasks.iter().filter(|t| !seen.contains(&t.id)).count();
                summary.updated = tasks.iter().filter(|t| seen.contains(&t.id)).count();
                summary.added = normalised.len() - summary.updated;
                normalised
            },
        };

        self.store.replace_all(&next).await?;
        *tasks = next;
        drop(tasks);

        info!(
            mode = ?mode,
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "schedule tasks imported"
        );
        Ok(summary)
    }

    /// Export all tasks, or the named ones in the order given.
    pub async fn export(&self, ids: Option<&[String]>) -> Result<Vec<ScheduleTask>> {
        let tasks = self.tasks.read().await;
        match ids {
            None => Ok(tasks.clone()),
            Some(ids) => ids
                .iter()
                .map(|id| {
                    tasks
                        .iter()
                        .find(|t| &t.id == id)
                        .cloned()
                        .ok_or_else(|| Error::task_not_found(id))
                })
                .collect(),
        }
    }

    pub async fn list(&self) -> Vec<ScheduleTask> {
        self.tasks.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ScheduleTask> {
        self.tasks.read().await.iter().find(|t| t.id == id).cloned()
    }

    pub async fn runs(&self, task_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        self.store.get_runs(task_id, limit).await
    }

    pub async fn status(&self) -> ScheduleStatus {
        let now = self.now();
        let tasks = self.tasks.read().await;
        ScheduleStatus {
            task_count: tasks.len(),
            enabled_count: tasks.iter().filter(|t| t.enabled).count(),
            due_count: tasks.iter().filter(|t| t.is_due(now)).count(),
            next_run_at: tasks
                .iter()
                .filter(|t| t.enabled)
                .filter_map(|t| t.next_run_at)
                .min(),
        }
    }
}

/// Restore the task invariants: disabled or exhausted tasks have no next
/// run, enabled ones always do.
fn settle(task: &mut ScheduleTask, now: u64, reschedule: bool) -> Result<()> {
    if !task.enabled || task.runs_exhausted() {
        task.disable();
        return Ok(());
    }
    if reschedule || task.next_run_at.is_none() {
        match initial_run(task, now)? {
            Some(next) => task.next_run_at = Some(next),
            None => task.disable(),
        }
    }
    Ok(())
}
