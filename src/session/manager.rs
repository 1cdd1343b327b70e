//! Native browser session management using `chromiumoxide`.
//!
//! Single source of truth for:
//! * Finding a usable Chromium-family executable (env override → PATH →
//!   well-known install paths).
//! * Launching a headless browser with stealth defaults (rotated user-agent,
//!   automation flags suppressed, fixed viewport).
//! * [`SessionManager`] — one persistent browser per run, fresh tab per
//!   search, transparent relaunch if the process has died.
//!
//! Stealth model: process-level flags and user-agent here, JS-level
//! `navigator` hardening injected per acquired page.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::driver::{CdpPage, PageDriver};
use crate::core::{EngineConfig, ExtractError};

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox 133 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `FAREWATCH_BROWSER` env var (explicit override).
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_browser_executable() -> Option<String> {
    if let Ok(p) = std::env::var("FAREWATCH_BROWSER") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "chromium",
            "chromium-browser",
            "google-chrome",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a `BrowserConfig` for headless operation with stealth defaults.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag; the UA is drawn from `DESKTOP_USER_AGENTS`.
/// Sandbox/dev-shm flags keep this working in containers and on small boards.
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua))
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

/// JS-level `navigator` hardening injected before any site script runs.
const STEALTH_SCRIPT: &str = r#"
(() => {
    try {
        Object.defineProperty(Navigator.prototype, 'webdriver', {
            get: () => undefined,
            configurable: true,
        });
        delete navigator.webdriver;
    } catch (e) {}
    try {
        Object.defineProperty(Navigator.prototype, 'languages', {
            get: () => ['en-US', 'en'],
            configurable: true,
        });
    } catch (e) {}
    try {
        Object.defineProperty(Navigator.prototype, 'plugins', {
            get: () => [1, 2, 3, 4, 5],
            configurable: true,
        });
    } catch (e) {}
})();
"#;

/// Session lifecycle seam: acquire a page for a search, reset it between
/// unrelated searches, release it afterwards.
///
/// The orchestrator guarantees `release` on every exit path; implementations
/// must tolerate reset/release on a broken page.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Page: PageDriver + Send + Sync;

    /// Create or reuse a session and hand out a ready page.
    /// `ExtractError::SessionStart` is fatal for the whole run.
    async fn acquire(&self) -> Result<Self::Page, ExtractError>;

    /// Clear per-search browser state without tearing the process down.
    async fn reset(&self, page: &Self::Page) -> Result<(), ExtractError>;

    /// Dispose of the page; the underlying browser stays warm.
    async fn release(&self, page: Self::Page);
}

/// One persistent browser per run, fresh tab per search.
///
/// Launch is lazy; if the process has died the next `acquire` relaunches it
/// transparently. Keeping a single instance amortizes the multi-second
/// startup across the whole batch of configured searches.
pub struct SessionManager {
    exe: String,
    viewport: (u32, u32),
    inner: Mutex<Option<Browser>>,
}

impl SessionManager {
    pub fn new(exe: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            exe: exe.into(),
            viewport: (config.viewport_width, config.viewport_height),
            inner: Mutex::new(None),
        }
    }

    /// Construct with the auto-discovered executable.
    /// Returns `None` if no browser is installed on this machine.
    pub fn new_auto(config: &EngineConfig) -> Option<Self> {
        find_browser_executable().map(|exe| Self::new(exe, config))
    }

    /// Gracefully close the browser at the end of a run.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut b) = guard.take() {
            let _ = b.close().await;
            info!("browser session shut down");
        }
    }
}

#[async_trait]
impl SessionProvider for SessionManager {
    type Page = CdpPage;

    async fn acquire(&self) -> Result<CdpPage, ExtractError> {
        let mut guard = self.inner.lock().await;

        // Probe: a blank tab tells us whether the process is still alive.
        let alive = match guard.as_mut() {
            Some(b) => b.new_page("about:blank").await.is_ok(),
            None => false,
        };

        if !alive {
            if guard.is_some() {
                warn!("browser instance dead, relaunching");
                if let Some(mut old) = guard.take() {
                    let _ = old.close().await;
                }
            }
            info!(exe = %self.exe, "launching browser");
            let config = build_headless_config(&self.exe, self.viewport.0, self.viewport.1)
                .map_err(|e| ExtractError::SessionStart(e.to_string()))?;
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| ExtractError::SessionStart(format!("{}: {}", self.exe, e)))?;
            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        warn!("CDP handler error: {}", e);
                    }
                }
            });
            *guard = Some(browser);
        }

        let b = guard
            .as_mut()
            .ok_or_else(|| ExtractError::SessionStart("browser missing after launch".into()))?;
        let page = b
            .new_page("about:blank")
            .await
            .map_err(|e| ExtractError::SessionStart(format!("failed to open tab: {}", e)))?;

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
        {
            warn!("stealth script injection failed: {}", e);
        }

        Ok(CdpPage::new(page))
    }

    async fn reset(&self, page: &CdpPage) -> Result<(), ExtractError> {
        page.clear_browsing_state().await?;
        Ok(())
    }

    async fn release(&self, page: CdpPage) {
        // Close only the tab; the browser stays warm for the next search.
        if let Err(e) = page.into_inner().close().await {
            warn!("tab close error (non-fatal): {}", e);
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Drop cannot await; spawn the close when inside a runtime to avoid
        // zombie Chromium processes.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if let Ok(mut guard) = self.inner.try_lock() {
            if let Some(mut browser) = guard.take() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                });
            }
        }
    }
}
