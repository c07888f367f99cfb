//! Executes container operations on a live page.
//!
//! Highlight, extract and scroll run as page scripts. Click and type go
//! through CDP input events so the page sees trusted user input.

use std::time::Duration;

use {
    async_trait::async_trait,
    cartograph_rules::{OperationExecutor, OperationOutcome, OperationRequest, OperationType},
    chromiumoxide::{
        Page,
        cdp::browser_protocol::input::{
            DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
            DispatchMouseEventType, MouseButton,
        },
    },
    serde_json::{Value, json},
    tracing::debug,
};

use crate::{
    error::BrowserError,
    page::evaluate_json,
    script::{self, ScriptOutcome},
};

pub struct CdpOperations {
    page: Page,
    timeout: Duration,
}

impl CdpOperations {
    pub fn new(page: Page, timeout: Duration) -> Self {
        Self { page, timeout }
    }

    async fn run_script(
        &self,
        op: &str,
        request: &OperationRequest,
    ) -> Result<ScriptOutcome, BrowserError> {
        let selector = request.target.selector.as_deref();
        let js = script::operate_script(op, &request.target.dom_paths, selector, &request.config)?;
        let result = evaluate_json(&self.page, &js, self.timeout).await?;
        script::parse_operation(&result, selector)
    }

    async fn click(&self, request: &OperationRequest) -> Result<OperationOutcome, BrowserError> {
        let located = self.run_script("locate", request).await?;
        let mut points = script::parse_points(&located.data);
        if points.is_empty() {
            return Err(BrowserError::NodeNotFound(describe_target(request)));
        }
        if !request.config["all"].as_bool().unwrap_or(false) {
            points.truncate(1);
        }

        for &(x, y) in &points {
            for kind in [
                DispatchMouseEventType::MousePressed,
                DispatchMouseEventType::MouseReleased,
            ] {
                let cmd = DispatchMouseEventParams::builder()
                    .r#type(kind)
                    .x(x)
                    .y(y)
                    .button(MouseButton::Left)
                    .click_count(1)
                    .build()
                    .map_err(|e| BrowserError::Cdp(e.to_string()))?;
                self.page.execute(cmd).await?;
            }
            debug!(x, y, "clicked");
        }

        Ok(OperationOutcome {
            affected: points.len(),
            data: Value::Null,
        })
    }

    async fn type_text(&self, request: &OperationRequest) -> Result<OperationOutcome, BrowserError> {
        let text = request.config["text"]
            .as_str()
            .ok_or_else(|| BrowserError::InvalidOperation("type requires config.text".into()))?;
        let focused = self.run_script("focus", request).await?;
        if focused.affected == 0 {
            return Err(BrowserError::NodeNotFound(describe_target(request)));
        }

        for c in text.chars() {
            for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
                let cmd = DispatchKeyEventParams::builder()
                    .r#type(kind)
                    .text(c.to_string())
                    .build()
                    .map_err(|e| BrowserError::Cdp(e.to_string()))?;
                self.page.execute(cmd).await?;
            }
        }

        Ok(OperationOutcome {
            affected: 1,
            data: json!({ "chars": text.chars().count() }),
        })
    }
}

fn describe_target(request: &OperationRequest) -> String {
    let target = &request.target;
    match (&target.container_id, target.dom_paths.first(), &target.selector) {
        (Some(id), Some(path), _) => format!("{id} at {path}"),
        (_, Some(path), _) => path.to_string(),
        (_, None, Some(selector)) => selector.clone(),
        _ => "empty target".to_string(),
    }
}

#[async_trait]
impl OperationExecutor for CdpOperations {
    async fn execute(&self, request: &OperationRequest) -> anyhow::Result<OperationOutcome> {
        if request.target.is_empty() {
            return Err(BrowserError::InvalidOperation(format!(
                "{} has no target",
                request.operation_type
            ))
            .into());
        }

        let outcome = match request.operation_type {
            OperationType::Highlight | OperationType::Extract | OperationType::Scroll => {
                let ScriptOutcome { affected, data } = self
                    .run_script(request.operation_type.as_str(), request)
                    .await?;
                OperationOutcome { affected, data }
            },
            OperationType::Click => self.click(request).await?,
            OperationType::Type => self.type_text(request).await?,
        };

        debug!(
            operation = %request.operation_type,
            container = request.target.container_id.as_deref().unwrap_or("-"),
            affected = outcome.affected,
            "operation executed"
        );
        Ok(outcome)
    }
}
