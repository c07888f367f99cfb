//! CLI subcommands for the schedule collection.

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    cartograph_config::CartographConfig,
    cartograph_schedule::{
        FileStore, ImportMode, RunResult, RunStatus, ScheduleService, ScheduleTask,
        ScheduleTaskCreate, ScheduleTaskPatch, ScheduleType,
    },
    chrono::{DateTime, Utc},
    clap::Subcommand,
    serde::de::DeserializeOwned,
    serde_json::Value,
};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// List every task in the collection.
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Add a task.
    Add {
        /// Generated when omitted.
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "")]
        name: String,
        /// once, daily, weekly or interval.
        #[arg(long = "type", value_parser = parse_lowercase::<ScheduleType>)]
        schedule_type: ScheduleType,
        /// RFC 3339 timestamp or epoch milliseconds.
        #[arg(long, value_parser = parse_time)]
        run_at: Option<u64>,
        #[arg(long)]
        interval_minutes: Option<u64>,
        /// IANA zone for daily/weekly tasks, e.g. `Asia/Shanghai`.
        #[arg(long)]
        timezone: Option<String>,
        /// 0 for unlimited.
        #[arg(long)]
        max_runs: Option<u32>,
        /// JSON payload handed back to whoever runs the task.
        #[arg(long, value_parser = parse_json)]
        payload: Option<Value>,
        #[arg(long, default_value_t = false)]
        disabled: bool,
    },
    /// Re-enable a task and compute its next run.
    Enable { id: String },
    /// Stop a task from coming due.
    Disable { id: String },
    /// Remove a task.
    Remove { id: String },
    /// List enabled tasks whose next run has passed.
    Due {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Record the outcome of a run.
    Done {
        id: String,
        #[arg(long, default_value = "ok", value_parser = parse_lowercase::<RunStatus>)]
        status: RunStatus,
        #[arg(long)]
        error: Option<String>,
        #[arg(long, value_parser = parse_time)]
        started_at: Option<u64>,
    },
    /// Show the run history of a task, newest last.
    Runs {
        id: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Summarise the collection.
    Status,
    /// Write tasks as a JSON array.
    Export {
        /// Only these tasks; all when empty.
        ids: Vec<String>,
        /// Write to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Load tasks from a JSON array.
    Import {
        file: PathBuf,
        /// Replace the whole collection instead of merging by id.
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
}

fn parse_lowercase<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase()))
        .map_err(|_| format!("unrecognised value '{raw}'"))
}

/// Epoch milliseconds, or an RFC 3339 timestamp.
fn parse_time(raw: &str) -> Result<u64, String> {
    if let Ok(ms) = raw.parse::<u64>() {
        return Ok(ms);
    }
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| format!("expected RFC 3339 or epoch milliseconds: {e}"))?;
    u64::try_from(parsed.timestamp_millis()).map_err(|_| "time before 1970".to_string())
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

fn format_time(ms: Option<u64>) -> String {
    ms.and_then(|ms| i64::try_from(ms).ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_row(task: &ScheduleTask) -> String {
    let runs = match task.max_runs {
        Some(max) => format!("{}/{max}", task.run_count),
        None => task.run_count.to_string(),
    };
    let label = if task.name.is_empty() {
        String::new()
    } else {
        format!("  {}", task.name)
    };
    format!(
        "{:<36}  {:<8}  {:<3}  {:<23}  {:>7}{label}",
        task.id,
        serde_json::to_value(task.schedule_type)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default(),
        if task.enabled { "on" } else { "off" },
        format_time(task.next_run_at),
        runs,
    )
}

fn print_tasks(tasks: &[ScheduleTask], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    println!(
        "{:<36}  {:<8}  {:<3}  {:<23}  {:>7}",
        "ID", "TYPE", "ON", "NEXT RUN", "RUNS"
    );
    for task in tasks {
        println!("{}", format_row(task));
    }
    Ok(())
}

async fn open(config: &CartographConfig) -> Result<ScheduleService> {
    let data_dir = cartograph_config::data_dir(config);
    let store = FileStore::for_collection(&data_dir, &config.schedule.collection)?;
    ScheduleService::load(Arc::new(store))
        .await
        .with_context(|| format!("failed to load {}", data_dir.display()))
}

pub async fn handle_schedule(config: &CartographConfig, action: &ScheduleAction) -> Result<()> {
    let service = open(config).await?;
    run(&service, action).await
}

async fn run(service: &ScheduleService, action: &ScheduleAction) -> Result<()> {
    match action {
        ScheduleAction::List { json } => print_tasks(&service.list().await, *json)?,
        ScheduleAction::Add {
            id,
            name,
            schedule_type,
            run_at,
            interval_minutes,
            timezone,
            max_runs,
            payload,
            disabled,
        } => {
            let task = service
                .add(ScheduleTaskCreate {
                    id: id.clone(),
                    name: name.clone(),
                    schedule_type: *schedule_type,
                    run_at: *run_at,
                    interval_minutes: *interval_minutes,
                    timezone: timezone.clone(),
                    max_runs: *max_runs,
                    payload: payload.clone().unwrap_or(Value::Null),
                    enabled: !disabled,
                })
                .await?;
            println!("Added {} (next run {})", task.id, format_time(task.next_run_at));
        },
        ScheduleAction::Enable { id } | ScheduleAction::Disable { id } => {
            let enabled = matches!(action, ScheduleAction::Enable { .. });
            let task = service
                .update(id, ScheduleTaskPatch {
                    enabled: Some(enabled),
                    ..Default::default()
                })
                .await?;
            println!(
                "{} {} (next run {})",
                if task.enabled { "Enabled" } else { "Disabled" },
                task.id,
                format_time(task.next_run_at)
            );
        },
        ScheduleAction::Remove { id } => {
            service.remove(id).await?;
            println!("Removed {id}");
        },
        ScheduleAction::Due { limit, json } => {
            let now = cartograph_common::now_ms();
            print_tasks(&service.list_due(*limit, now).await, *json)?;
        },
        ScheduleAction::Done {
            id,
            status,
            error,
            started_at,
        } => {
            let task = service
                .mark_result(id, RunResult {
                    status: *status,
                    finished_at: None,
                    started_at: *started_at,
                    error: error.clone(),
                })
                .await?;
            println!(
                "Recorded run {} of {} (next run {})",
                task.run_count,
                task.id,
                format_time(task.next_run_at)
            );
        },
        ScheduleAction::Runs { id, limit } => {
            for record in service.runs(id, *limit).await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        },
        ScheduleAction::Status => {
            println!("{}", serde_json::to_string_pretty(&service.status().await)?);
        },
        ScheduleAction::Export { ids, output } => {
            let filter = (!ids.is_empty()).then_some(ids.as_slice());
            let tasks = service.export(filter).await?;
            let body = serde_json::to_string_pretty(&tasks)?;
            match output {
                Some(path) => {
                    std::fs::write(path, body)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Exported {} task(s) to {}", tasks.len(), path.display());
                },
                None => println!("{body}"),
            }
        },
        ScheduleAction::Import { file, replace } => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let tasks: Vec<ScheduleTask> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a task array", file.display()))?;
            let mode = if *replace {
                ImportMode::Replace
            } else {
                ImportMode::Merge
            };
            let summary = service.import(tasks, mode).await?;
            println!(
                "Imported: {} added, {} updated, {} removed",
                summary.added, summary.updated, summary.removed
            );
        },
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*, cartograph_schedule::MemoryStore, rstest::rstest, serde_json::json,
        std::sync::atomic::{AtomicU64, Ordering},
    };

    const FEB_1: u64 = 1_706_745_600_000;

    #[rstest]
    #[case("1706745600000", Some(FEB_1))]
    #[case("2024-02-01T00:00:00Z", Some(FEB_1))]
    #[case("2024-02-01T08:00:00+08:00", Some(FEB_1))]
    #[case("tomorrow", None)]
    fn parses_times(#[case] raw: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_time(raw).ok(), expected);
    }

    #[test]
    fn parses_enum_names_case_insensitively() {
        assert_eq!(
            parse_lowercase::<ScheduleType>("Weekly").unwrap(),
            ScheduleType::Weekly
        );
        assert_eq!(
            parse_lowercase::<RunStatus>("skipped").unwrap(),
            RunStatus::Skipped
        );
        assert!(parse_lowercase::<ScheduleType>("hourly").is_err());
    }

    #[test]
    fn formats_times() {
        assert_eq!(format_time(Some(FEB_1)), "2024-02-01 00:00:00 UTC");
        assert_eq!(format_time(None), "-");
    }

    async fn service_at(now: Arc<AtomicU64>) -> ScheduleService {
        ScheduleService::with_clock(
            Arc::new(MemoryStore::new()),
            Arc::new(move || now.load(Ordering::SeqCst)),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn add_done_disable_round() {
        let now = Arc::new(AtomicU64::new(FEB_1));
        let service = service_at(Arc::clone(&now)).await;

        run(&service, &ScheduleAction::Add {
            id: Some("digest".into()),
            name: "Morning digest".into(),
            schedule_type: ScheduleType::Interval,
            run_at: None,
            interval_minutes: Some(30),
            timezone: None,
            max_runs: Some(2),
            payload: Some(json!({ "url": "https://weibo.com/" })),
            disabled: false,
        })
        .await
        .unwrap();
        let task = service.get("digest").await.unwrap();
        assert_eq!(task.max_runs, Some(2));
        assert_eq!(task.payload["url"], "https://weibo.com/");

        now.store(FEB_1 + 60_000, Ordering::SeqCst);
        run(&service, &ScheduleAction::Done {
            id: "digest".into(),
            status: RunStatus::Ok,
            error: None,
            started_at: None,
        })
        .await
        .unwrap();
        let task = service.get("digest").await.unwrap();
        assert_eq!(task.run_count, 1);
        assert_eq!(task.next_run_at, Some(FEB_1 + 60_000 + 30 * 60_000));

        run(&service, &ScheduleAction::Disable {
            id: "digest".into(),
        })
        .await
        .unwrap();
        let task = service.get("digest").await.unwrap();
        assert!(!task.enabled);
        assert!(task.next_run_at.is_none());
    }

    #[tokio::test]
    async fn export_then_import_into_another_collection() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tasks.json");
        let now = Arc::new(AtomicU64::new(FEB_1));

        let source = service_at(Arc::clone(&now)).await;
        for id in ["a", "b"] {
            run(&source, &ScheduleAction::Add {
                id: Some(id.into()),
                name: String::new(),
                schedule_type: ScheduleType::Daily,
                run_at: Some(FEB_1 + 3_600_000),
                interval_minutes: None,
                timezone: Some("Asia/Shanghai".into()),
                max_runs: None,
                payload: None,
                disabled: false,
            })
            .await
            .unwrap();
        }
        run(&source, &ScheduleAction::Export {
            ids: vec!["b".into()],
            output: Some(out.clone()),
        })
        .await
        .unwrap();

        let target = service_at(now).await;
        run(&target, &ScheduleAction::Import {
            file: out,
            replace: false,
        })
        .await
        .unwrap();
        let ids: Vec<String> = target.list().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let service = service_at(Arc::new(AtomicU64::new(FEB_1))).await;
        let err = run(&service, &ScheduleAction::Remove { id: "ghost".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
