//! JSON file-backed schedule store with atomic writes.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    tokio::{fs, io::AsyncWriteExt},
    tracing::debug,
};

use crate::{
    error::{Context, Error, Result},
    store::ScheduleStore,
    types::{RunRecord, ScheduleTask},
};

/// Tasks in a single JSON array file, runs as JSONL per task.
pub struct FileStore {
    tasks_path: PathBuf,
    runs_dir: PathBuf,
}

impl FileStore {
    pub fn new(tasks_path: PathBuf, runs_dir: PathBuf) -> Self {
        Self {
            tasks_path,
            runs_dir,
        }
    }

    /// `<data_dir>/schedules/<collection>.json`, runs under
    /// `<data_dir>/schedules/<collection>.runs/`.
    pub fn for_collection(data_dir: &Path, collection: &str) -> Result<Self> {
        if collection.is_empty() || collection.contains(['/', '\\']) || collection == ".." {
            return Err(Error::validation(format!(
                "invalid collection name '{collection}'"
            )));
        }
        let base = data_dir.join("schedules");
        Ok(Self::new(
            base.join(format!("{collection}.json")),
            base.join(format!("{collection}.runs")),
        ))
    }

    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    async fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.tasks_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::create_dir_all(&self.runs_dir).await?;
        Ok(())
    }

    /// Write to a temp file, keep the previous file as `.bak`, rename over.
    async fn atomic_write_tasks(&self, tasks: &[ScheduleTask]) -> Result<()> {
        self.ensure_dirs().await?;
        let json = serde_json::to_string_pretty(tasks)?;
        let tmp = self.tasks_path.with_extension("json.tmp");

        fs::write(&tmp, json.as_bytes()).await?;

        if fs::try_exists(&self.tasks_path).await.unwrap_or(false) {
            let bak = self.tasks_path.with_extension("json.bak");
            if let Err(e) = fs::copy(&self.tasks_path, &bak).await {
                debug!(path = %bak.display(), error = %e, "failed to refresh schedule backup");
            }
        }

        fs::rename(&tmp, &self.tasks_path).await?;
        debug!(path = %self.tasks_path.display(), count = tasks.len(), "schedule collection written");
        Ok(())
    }

    fn runs_path(&self, task_id: &str) -> Result<PathBuf> {
        if task_id.is_empty() || task_id.contains(['/', '\\']) || task_id.contains("..") {
            return Err(Error::validation(format!("invalid task id '{task_id}'")));
        }
        Ok(self.runs_dir.join(format!("{task_id}.jsonl")))
    }
}

#[async_trait]
impl ScheduleStore for FileStore {
    async fn load_tasks(&self) -> Result<Vec<ScheduleTask>> {
        if !fs::try_exists(&self.tasks_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.tasks_path).await?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse {}", self.tasks_path.display()))
    }

    async fn save_task(&self, task: &ScheduleTask) -> Result<()> {
        let mut tasks = self.load_tasks().await?;
        if let Some(pos) = tasks.iter().position(|t| t.id == task.id) {
            tasks[pos] = task.clone();
        } else {
            tasks.push(task.clone());
        }
        self.atomic_write_tasks(&tasks).await
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        let mut tasks = self.load_tasks().await?;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Err(Error::task_not_found(id));
        }
        self.atomic_write_tasks(&tasks).await
    }

    async fn update_task(&self, task: &ScheduleTask) -> Result<()> {
        let mut tasks = self.load_tasks().await?;
        let pos = tasks
            .iter()
            .position(|t| t.id == task.id)
            .ok_or_else(|| Error::task_not_found(&task.id))?;
        tasks[pos] = task.clone();
        self.atomic_write_tasks(&tasks).await
    }

    async fn replace_all(&self, tasks: &[ScheduleTask]) -> Result<()> {
        self.atomic_write_tasks(tasks).await
    }

    async fn append_run(&self, task_id: &str, run: &RunRecord) -> Result<()> {
        let path = self.runs_path(task_id)?;
        self.ensure_dirs().await?;
        let mut line = serde_json::to_string(run)?;
        line.push('\n');
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?
            .write_all(line.as_bytes())
            .await?;
        Ok(())
    }

    async fn get_runs(&self, task_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let path = self.runs_path(task_id)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&path).await?;
        let all: Vec<RunRecord> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }
}
