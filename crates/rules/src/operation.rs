//! The boundary to whatever performs operations on a page.

use std::{fmt, str::FromStr};

use {
    async_trait::async_trait,
    cartograph_dom::DomPath,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::error::RuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Highlight,
    Click,
    Extract,
    Scroll,
    Type,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Highlight => "highlight",
            Self::Click => "click",
            Self::Extract => "extract",
            Self::Scroll => "scroll",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highlight" => Ok(Self::Highlight),
            "click" => Ok(Self::Click),
            "extract" => Ok(Self::Extract),
            "scroll" => Ok(Self::Scroll),
            "type" | "input" => Ok(Self::Type),
            other => Err(RuleError::validation(format!(
                "unknown operation type '{other}'"
            ))),
        }
    }
}

/// Where an operation applies. Executors use `dom_paths` when present and
/// fall back to `selector`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dom_paths: Vec<DomPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl OperationTarget {
    pub fn container(id: impl Into<String>, dom_paths: Vec<DomPath>) -> Self {
        Self {
            container_id: Some(id.into()),
            dom_paths,
            selector: None,
        }
    }

    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dom_paths.is_empty() && self.selector.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub operation_type: OperationType,
    #[serde(default)]
    pub config: Value,
    pub target: OperationTarget,
}

/// Successful result of an operation. Failures are errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Elements the operation touched.
    pub affected: usize,
    /// Operation-specific output (extracted text, scroll offsets).
    #[serde(default)]
    pub data: Value,
}

#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, request: &OperationRequest) -> anyhow::Result<OperationOutcome>;
}
