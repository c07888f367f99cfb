//! [`DomQuery`] over a live chromiumoxide page.

use std::time::Duration;

use {
    async_trait::async_trait,
    cartograph_dom::{DomError, DomPath, DomQuery, NodeInfo, QueryOutcome},
    chromiumoxide::Page,
    serde_json::Value,
    tokio::time::timeout,
    tracing::debug,
};

use crate::{error::BrowserError, script};

/// Evaluate `js` on `page`, bounded by `limit`.
pub(crate) async fn evaluate_json(
    page: &Page,
    js: &str,
    limit: Duration,
) -> Result<Value, BrowserError> {
    let evaluation = timeout(limit, page.evaluate(js))
        .await
        .map_err(|_| BrowserError::Timeout(format!("script exceeded {}ms", limit.as_millis())))?
        .map_err(BrowserError::from)?;
    evaluation
        .into_value()
        .map_err(|e| BrowserError::JsEvalFailed(format!("failed to get result: {e:?}")))
}

/// Read-only DOM access to one page, addressed by [`DomPath`].
#[derive(Clone)]
pub struct CdpDom {
    page: Page,
    timeout: Duration,
}

impl CdpDom {
    pub fn new(page: Page, timeout: Duration) -> Self {
        Self { page, timeout }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn url(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.page.url().await?)
    }
}

#[async_trait]
impl DomQuery for CdpDom {
    async fn query(
        &self,
        scope: Option<&DomPath>,
        selector: &str,
        limit: usize,
    ) -> cartograph_dom::Result<QueryOutcome> {
        let js = script::query_script(scope, selector, limit)?;
        let result = evaluate_json(&self.page, &js, self.timeout).await?;
        let outcome = script::parse_query(&result, selector)?;
        debug!(
            selector,
            scope = ?scope.map(ToString::to_string),
            total = outcome.total,
            "cdp query"
        );
        Ok(outcome)
    }

    async fn inspect(&self, path: &DomPath) -> cartograph_dom::Result<NodeInfo> {
        let js = script::inspect_script(path)?;
        let result = evaluate_json(&self.page, &js, self.timeout).await?;
        script::parse_node_info(&result).map_err(|e| match e {
            BrowserError::NodeNotFound(_) => DomError::node_not_found(path),
            other => other.into(),
        })
    }
}
