//! Launching Chromium and tracking open pages by session id.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    cartograph_config::BrowserConfig,
    cartograph_dom::{DomError, DomQuery, DomSessions},
    chromiumoxide::{Browser, BrowserConfig as CdpBrowserConfig, Page, handler::viewport::Viewport},
    futures::StreamExt,
    tokio::{sync::RwLock, task::JoinHandle},
    tracing::{debug, info, warn},
};

use crate::{
    detect::{install_hint, locate_browser},
    error::BrowserError,
    operations::CdpOperations,
    page::CdpDom,
};

/// A browser process with one page open on the requested URL.
pub struct LaunchedPage {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    timeout: Duration,
}

impl LaunchedPage {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn dom(&self) -> CdpDom {
        CdpDom::new(self.page.clone(), self.timeout)
    }

    pub fn operations(&self) -> CdpOperations {
        CdpOperations::new(self.page.clone(), self.timeout)
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser did not close cleanly");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        debug!("browser closed");
    }
}

/// Launch a host browser and navigate a fresh page to `url`.
pub async fn launch_page(config: &BrowserConfig, url: &str) -> Result<LaunchedPage, BrowserError> {
    validate_url(url)?;
    let executable =
        locate_browser(config.chrome_path.as_deref()).ok_or(BrowserError::BrowserNotAvailable)?;
    let timeout = Duration::from_millis(config.navigation_timeout_ms);

    let mut builder = CdpBrowserConfig::builder()
        .chrome_executable(&executable)
        .viewport(Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
            device_scale_factor: Some(config.device_scale_factor),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .request_timeout(timeout);
    // chromiumoxide is headless unless told otherwise.
    if !config.headless {
        builder = builder.with_head();
    }
    if let Some(ref ua) = config.user_agent {
        builder = builder.arg(format!("--user-agent={ua}"));
    }
    for arg in &config.chrome_args {
        builder = builder.arg(arg);
    }
    let cdp_config = builder
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--no-sandbox")
        .build()
        .map_err(|e| BrowserError::LaunchFailed(format!("failed to build browser config: {e}")))?;

    let (browser, mut events) = Browser::launch(cdp_config).await.map_err(|e| {
        BrowserError::LaunchFailed(format!("browser launch failed: {e}\n\n{}", install_hint()))
    })?;
    let handler = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Err(e) = event {
                debug!(error = %e, "browser handler event error");
            }
        }
    });

    let page = browser
        .new_page(url)
        .await
        .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
    if let Err(e) = page.wait_for_navigation().await {
        warn!(url, error = %e, "navigation did not settle");
    }

    info!(
        path = %executable.display(),
        url,
        headless = config.headless,
        "browser page ready"
    );
    Ok(LaunchedPage {
        browser,
        handler,
        page,
        timeout,
    })
}

fn validate_url(url: &str) -> Result<(), BrowserError> {
    let parsed =
        url::Url::parse(url).map_err(|e| BrowserError::NavigationFailed(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" | "file" => Ok(()),
        other => Err(BrowserError::NavigationFailed(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

/// Open pages keyed by session id.
pub struct PageSessions {
    pages: RwLock<HashMap<String, Page>>,
    timeout: Duration,
}

impl PageSessions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Register `page`, generating an id when none is given.
    pub async fn insert(&self, session_id: Option<&str>, page: Page) -> String {
        let sid = session_id
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(generate_session_id);
        self.pages.write().await.insert(sid.clone(), page);
        info!(session_id = %sid, "page session registered");
        sid
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.pages.write().await.remove(session_id).is_some();
        if removed {
            info!(session_id, "page session closed");
        }
        removed
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pages.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn page(&self, session_id: &str) -> Result<Page, BrowserError> {
        self.pages
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| BrowserError::ConnectionClosed(format!("no page for {session_id}")))
    }

    pub async fn operations(&self, session_id: &str) -> Result<Arc<CdpOperations>, BrowserError> {
        let page = self.page(session_id).await?;
        Ok(Arc::new(CdpOperations::new(page, self.timeout)))
    }
}

#[async_trait]
impl DomSessions for PageSessions {
    async fn session(&self, session_id: &str) -> cartograph_dom::Result<Arc<dyn DomQuery>> {
        let page = self
            .page(session_id)
            .await
            .map_err(|_| DomError::SessionUnavailable(session_id.to_string()))?;
        Ok(Arc::new(CdpDom::new(page, self.timeout)))
    }
}

fn generate_session_id() -> String {
    format!("page-{}", uuid::Uuid::new_v4().simple())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn session_ids_are_unique() {
        let a = generate_session_id();
        assert!(a.starts_with("page-"));
        assert_ne!(a, generate_session_id());
    }

    #[rstest]
    #[case("https://weibo.com/", true)]
    #[case("file:///tmp/page.html", true)]
    #[case("javascript:alert(1)", false)]
    #[case("not a url", false)]
    fn url_validation(#[case] url: &str, #[case] ok: bool) {
        assert_eq!(validate_url(url).is_ok(), ok);
    }

    #[tokio::test]
    async fn unknown_session_is_unavailable() {
        let sessions = PageSessions::new(Duration::from_secs(1));
        let err = match sessions.session("ghost").await {
            Err(e) => e,
            Ok(_) => panic!("expected an unavailable session"),
        };
        assert!(matches!(err, DomError::SessionUnavailable(ref id) if id == "ghost"));
        assert!(sessions.ids().await.is_empty());
        assert!(!sessions.remove("ghost").await);
    }
}
