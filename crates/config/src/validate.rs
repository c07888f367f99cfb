//! Sanity checks over a loaded config.

use std::fmt;

use serde::Serialize;

use crate::schema::CartographConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level}: {}: {}", self.path, self.message)
    }
}

impl CartographConfig {
    /// Report settings that are legal to parse but unlikely to work.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let mut push = |severity, path: &str, message: &str| {
            out.push(Diagnostic {
                severity,
                path: path.to_string(),
                message: message.to_string(),
            });
        };

        if self.matcher.max_children == 0 {
            push(
                Severity::Error,
                "matcher.max_children",
                "must be > 0, nothing would ever match",
            );
        }
        if self.fetch.max_depth > self.fetch.depth_cap {
            push(
                Severity::Warning,
                "fetch.max_depth",
                "exceeds fetch.depth_cap and will be clamped",
            );
        }
        if self.fetch.max_children > self.fetch.children_cap {
            push(
                Severity::Warning,
                "fetch.max_children",
                "exceeds fetch.children_cap and will be clamped",
            );
        }
        if self.bus.history_limit == 0 {
            push(
                Severity::Warning,
                "bus.history_limit",
                "0 disables event history",
            );
        }
        if self.workflow.evaluation_limit == 0 {
            push(
                Severity::Warning,
                "workflow.evaluation_limit",
                "0 disables rule evaluation logs",
            );
        }
        if self.schedule.collection.trim().is_empty()
            || self.schedule.collection.contains(['/', '\\'])
        {
            push(
                Severity::Error,
                "schedule.collection",
                "must be a non-empty file name",
            );
        }
        if self.browser.viewport_width == 0 || self.browser.viewport_height == 0 {
            push(
                Severity::Error,
                "browser.viewport_width",
                "viewport dimensions must be > 0",
            );
        }
        if self.browser.navigation_timeout_ms == 0 {
            push(
                Severity::Warning,
                "browser.navigation_timeout_ms",
                "0 means every CDP command times out immediately",
            );
        }
        for (i, lib) in self.libraries.iter().enumerate() {
            if lib.extension().and_then(|e| e.to_str()) != Some("json") {
                push(
                    Severity::Warning,
                    &format!("libraries[{i}]"),
                    "container libraries are JSON documents",
                );
            }
        }
        out
    }
}
