//! Page capability seam.
//!
//! Everything above the session layer (overlay resolver, navigator,
//! extractor, orchestrator) talks to the browser exclusively through
//! [`PageDriver`], so the whole engine can be exercised against a scripted
//! fake page in tests. The real implementation wraps a `chromiumoxide` tab.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::Page;
use std::time::{Duration, Instant};

use crate::core::DriveError;

/// The minimal capability set the extraction engine needs from a live page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to `url` and let the initial load settle.
    async fn goto(&self, url: &str) -> Result<(), DriveError>;

    /// Wait up to `timeout` for any element matching `selector`.
    /// Returns `false` on expiry — absence is not an error.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, DriveError>;

    /// Click the first element matching `selector` if present.
    /// Returns `false` when nothing matched.
    async fn click(&self, selector: &str) -> Result<bool, DriveError>;

    /// Send an Escape keypress to the document (dismisses focus-trapping
    /// promos that have no reliable close button).
    async fn press_escape(&self) -> Result<(), DriveError>;

    /// Snapshot of the currently rendered DOM.
    async fn html(&self) -> Result<String, DriveError>;

    /// Clear cookies and web storage without tearing the browser down.
    async fn clear_browsing_state(&self) -> Result<(), DriveError>;
}

/// [`PageDriver`] backed by one `chromiumoxide` tab.
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub(crate) fn into_inner(self) -> Page {
        self.page
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> Result<(), DriveError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriveError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, DriveError> {
        let start = Instant::now();
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<bool, DriveError> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(false);
        };
        element
            .click()
            .await
            .map_err(|e| DriveError::Script(format!("click '{}': {}", selector, e)))?;
        Ok(true)
    }

    async fn press_escape(&self) -> Result<(), DriveError> {
        self.page
            .evaluate(
                "document.dispatchEvent(new KeyboardEvent('keydown', \
                 {key: 'Escape', code: 'Escape', bubbles: true}))",
            )
            .await
            .map_err(|e| DriveError::Script(e.to_string()))?;
        Ok(())
    }

    async fn html(&self) -> Result<String, DriveError> {
        self.page
            .content()
            .await
            .map_err(|e| DriveError::Closed(e.to_string()))
    }

    async fn clear_browsing_state(&self) -> Result<(), DriveError> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| DriveError::Script(format!("clear cookies: {}", e)))?;
        // Storage clears can fail on about:blank; that state is empty anyway.
        let _ = self
            .page
            .evaluate("try { localStorage.clear(); sessionStorage.clear(); } catch (e) {}")
            .await;
        Ok(())
    }
}
