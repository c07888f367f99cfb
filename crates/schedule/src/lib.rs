//! Recurring task definitions with computed due times.
//!
//! Tasks live in one JSON file per collection at
//! `<data_dir>/schedules/<collection>.json`, with per-task run history as
//! JSONL beside it. Callers poll [`ScheduleService::list_due`] and report
//! back through [`ScheduleService::mark_result`]; nothing here executes
//! tasks.

pub mod error;
pub mod schedule;
pub mod service;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod types;

pub use {
    error::{Error, Result},
    service::{Clock, ScheduleService},
    store::ScheduleStore,
    store_file::FileStore,
    store_memory::MemoryStore,
    types::{
        ImportMode, ImportSummary, RunRecord, RunResult, RunStatus, ScheduleStatus, ScheduleTask,
        ScheduleTaskCreate, ScheduleTaskPatch, ScheduleType,
    },
};
