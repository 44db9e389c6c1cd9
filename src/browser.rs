//! Thin facade over the chromiumoxide browser driver
//!
//! Every blocking operation takes an effective timeout and fails with
//! `AutomationError::Timeout` carrying the selector and elapsed time.
//! Element handles are opaque wrappers; callers never touch chromiumoxide
//! types directly.

use crate::config::{create_browser_config, AutomationConfig};
use crate::error::AutomationError;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Element wait states for `wait_for_selector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Attached,
    Visible,
    Hidden,
}

pub struct BrowserDriver {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
}

impl BrowserDriver {
    /// Launch Chrome with the run's settings and open a blank page.
    pub async fn launch(config: &AutomationConfig) -> Result<Self, AutomationError> {
        let browser_config = create_browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AutomationError::Internal(format!("browser launch failed: {e}")))?;

        // The CDP handler is a stream that must be polled for the browser
        // to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler error: {e}");
                }
            }
            debug!("browser handler stream ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AutomationError::Internal(format!("cannot open page: {e}")))?;

        info!(headless = config.headless, "browser launched");

        Ok(Self {
            browser,
            handler_task,
            page,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Open a fresh page and retire the current one.
    pub async fn new_page(&mut self, url: &str) -> Result<(), AutomationError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| AutomationError::Internal(format!("cannot open page: {e}")))?;
        let old = std::mem::replace(&mut self.page, page);
        let _ = old.close().await;
        Ok(())
    }

    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AutomationError> {
        self.with_timeout(url, timeout, async {
            self.page
                .goto(url)
                .await
                .map_err(|e| AutomationError::NavigationFailed(format!("{url}: {e}")))?;
            // Best-effort settle; some pages have no pending navigation by
            // the time goto returns.
            let _ = self.page.wait_for_navigation().await;
            Ok(())
        })
        .await
    }

    pub async fn reload(&self, timeout: Duration) -> Result<(), AutomationError> {
        self.with_timeout("<reload>", timeout, async {
            self.page
                .reload()
                .await
                .map_err(|e| AutomationError::NavigationFailed(format!("reload: {e}")))?;
            Ok(())
        })
        .await
    }

    /// History back-navigation; the close-icon fallback of last resort.
    pub async fn back(&self) -> Result<(), AutomationError> {
        self.page
            .evaluate("history.back()")
            .await
            .map_err(|e| AutomationError::NavigationFailed(format!("history.back: {e}")))?;
        Ok(())
    }

    pub async fn current_url(&self) -> String {
        match self.page.url().await {
            Ok(Some(url)) => url,
            _ => "about:blank".to_string(),
        }
    }

    /// Poll until the selector reaches the requested state.
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
        state: WaitState,
    ) -> Result<Option<ElementHandle>, AutomationError> {
        let start = Instant::now();
        loop {
            let found = self.query(selector).await?;
            match state {
                WaitState::Attached => {
                    if let Some(handle) = found {
                        return Ok(Some(handle));
                    }
                }
                WaitState::Visible => {
                    if let Some(handle) = found {
                        if handle.is_visible().await {
                            return Ok(Some(handle));
                        }
                    }
                }
                WaitState::Hidden => {
                    match found {
                        Some(handle) if handle.is_visible().await => {}
                        _ => return Ok(None),
                    }
                }
            }

            if start.elapsed() >= timeout {
                return Err(AutomationError::timeout(selector, start.elapsed()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// First match, or None. Absence is not an error at this layer.
    pub async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, AutomationError> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(Some(ElementHandle::new(element))),
            Err(_) => Ok(None),
        }
    }

    pub async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, AutomationError> {
        match self.page.find_elements(selector).await {
            Ok(elements) => Ok(elements.into_iter().map(ElementHandle::new).collect()),
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Click the first visible match. `force` falls back to a scripted
    /// click, which works on elements Chrome considers unclickable.
    pub async fn click(
        &self,
        selector: &str,
        force: bool,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let handle = self
            .wait_for_selector(selector, timeout, WaitState::Visible)
            .await?
            .ok_or_else(|| AutomationError::ElementNotFound(selector.to_string()))?;

        match handle.click().await {
            Ok(()) => Ok(()),
            Err(e) if force => {
                debug!(selector, "native click failed ({e}), forcing via script");
                handle.js_click().await
            }
            Err(e) => Err(e),
        }
    }

    /// Clear the input and type the text.
    pub async fn fill(
        &self,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let handle = self
            .wait_for_selector(selector, timeout, WaitState::Visible)
            .await?
            .ok_or_else(|| AutomationError::ElementNotFound(selector.to_string()))?;

        handle.click().await?;
        handle
            .element
            .call_js_fn(
                "function() { if ('value' in this) { this.value = ''; this.dispatchEvent(new Event('input', {bubbles: true})); } }",
                false,
            )
            .await
            .map_err(|e| AutomationError::Internal(format!("clearing {selector}: {e}")))?;
        handle
            .element
            .type_str(text)
            .await
            .map_err(|e| AutomationError::Internal(format!("typing into {selector}: {e}")))?;
        Ok(())
    }

    /// Attach a file to a file input without opening the picker dialog.
    pub async fn upload(
        &self,
        selector: &str,
        absolute_path: &Path,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let handle = self
            .wait_for_selector(selector, timeout, WaitState::Attached)
            .await?
            .ok_or_else(|| AutomationError::ElementNotFound(selector.to_string()))?;

        let params = SetFileInputFilesParams::builder()
            .file(absolute_path.to_string_lossy().to_string())
            .backend_node_id(handle.element.backend_node_id.clone())
            .build()
            .map_err(|e| AutomationError::Internal(format!("upload params: {e}")))?;

        self.page
            .execute(params)
            .await
            .map_err(|e| AutomationError::Internal(format!("upload to {selector}: {e}")))?;
        Ok(())
    }

    /// Evaluate a script and return its JSON value.
    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value, AutomationError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| AutomationError::Internal(format!("evaluate failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    pub async fn screenshot(&self, path: &Path) -> Result<(), AutomationError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let data = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| AutomationError::Internal(format!("screenshot failed: {e}")))?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    /// Route browser downloads into `dir` (must precede any download).
    pub async fn set_download_dir(&self, dir: &Path) -> Result<(), AutomationError> {
        tokio::fs::create_dir_all(dir).await?;
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.to_string_lossy().to_string())
            .build()
            .map_err(|e| AutomationError::Internal(format!("download behavior: {e}")))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| AutomationError::DownloadFailed(format!("set download dir: {e}")))?;
        Ok(())
    }

    /// Run `trigger`, then wait for the next completed file to land in
    /// `target_dir`. In-flight `.crdownload` files do not count.
    pub async fn download_next<F, Fut>(
        &self,
        trigger: F,
        target_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, AutomationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), AutomationError>>,
    {
        self.set_download_dir(target_dir).await?;
        let before = list_files(target_dir)?;

        trigger().await?;

        let start = Instant::now();
        loop {
            for path in list_files(target_dir)? {
                if before.contains(&path) {
                    continue;
                }
                let name = path.file_name().unwrap_or_default().to_string_lossy();
                if name.ends_with(".crdownload") || name.ends_with(".tmp") {
                    continue;
                }
                debug!(file = %path.display(), "download captured");
                return Ok(path);
            }

            if start.elapsed() >= timeout {
                return Err(AutomationError::DownloadFailed(format!(
                    "no file appeared in {} within {:?}",
                    target_dir.display(),
                    timeout
                )));
            }
            sleep(DOWNLOAD_POLL_INTERVAL).await;
        }
    }

    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        self.handler_task.abort();
        info!("browser closed");
    }

    /// Detach without closing the window (`keep_browser_open` runs).
    pub fn detach(self) {
        self.handler_task.abort();
        std::mem::forget(self.browser);
        info!("browser left open");
    }

    async fn with_timeout<T>(
        &self,
        selector: &str,
        limit: Duration,
        operation: impl Future<Output = Result<T, AutomationError>>,
    ) -> Result<T, AutomationError> {
        let start = Instant::now();
        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(AutomationError::timeout(selector, start.elapsed())),
        }
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, AutomationError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

/// Opaque element handle owned by the facade.
pub struct ElementHandle {
    element: Element,
}

impl ElementHandle {
    fn new(element: Element) -> Self {
        Self { element }
    }

    /// Visible text, empty when unavailable.
    pub async fn text(&self) -> String {
        self.element
            .inner_text()
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    pub async fn attribute(&self, name: &str) -> Option<String> {
        self.element.attribute(name).await.ok().flatten()
    }

    pub async fn dom_id(&self) -> Option<String> {
        self.attribute("id").await
    }

    /// The `value` DOM property, for inputs.
    pub async fn value_property(&self) -> Result<String, AutomationError> {
        let result = self
            .element
            .call_js_fn("function() { return this.value ?? ''; }", false)
            .await
            .map_err(|e| AutomationError::Internal(format!("reading value property: {e}")))?;
        Ok(result
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    pub async fn is_visible(&self) -> bool {
        let script = "function() { \
            const rect = this.getBoundingClientRect(); \
            const style = window.getComputedStyle(this); \
            return rect.width > 0 && rect.height > 0 \
                && style.visibility !== 'hidden' && style.display !== 'none'; \
        }";
        match self.element.call_js_fn(script, false).await {
            Ok(result) => result
                .result
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn click(&self) -> Result<(), AutomationError> {
        self.element
            .click()
            .await
            .map(|_| ())
            .map_err(|e| AutomationError::Internal(format!("click failed: {e}")))
    }

    /// Scripted `HTMLElement.click()`, bypassing hit-testing.
    pub async fn js_click(&self) -> Result<(), AutomationError> {
        self.element
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map(|_| ())
            .map_err(|e| AutomationError::Internal(format!("scripted click failed: {e}")))
    }

    /// Synthetic bubbling MouseEvent, the last rung of the click ladder.
    pub async fn dispatch_click(&self) -> Result<(), AutomationError> {
        self.element
            .call_js_fn(
                "function() { this.dispatchEvent(new MouseEvent('click', {bubbles: true, cancelable: true, view: window})); }",
                false,
            )
            .await
            .map(|_| ())
            .map_err(|e| AutomationError::Internal(format!("dispatched click failed: {e}")))
    }

    pub async fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.element
            .scroll_into_view()
            .await
            .map(|_| ())
            .map_err(|e| AutomationError::Internal(format!("scroll into view failed: {e}")))
    }

    /// Center of the element's box model, for spatial candidate selection.
    pub async fn center_point(&self) -> Result<(f64, f64), AutomationError> {
        let point = self
            .element
            .clickable_point()
            .await
            .map_err(|e| AutomationError::Internal(format!("no clickable point: {e}")))?;
        Ok((point.x, point.y))
    }
}
