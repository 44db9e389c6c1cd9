//! Generation-download management: the stateful gallery crawler
//!
//! Walks a virtualized gallery of generations, opens each completed item,
//! extracts its creation datetime and prompt, checks the pair against the
//! download log, downloads the watermark-free variant, and appends a log
//! record. In SKIP mode a duplicate triggers the exit-scan-return protocol:
//! leave the detail view, walk the gallery comparing every container to the
//! log, and resume at the first container the log does not know.

use crate::browser::{BrowserDriver, ElementHandle};
use crate::download_log::{DownloadLog, DownloadLogEntry};
use crate::error::AutomationError;
use crate::metadata::{
    closest_candidate, is_canonical_datetime, parse_canonical_datetime, render_filename,
    strip_ellipsis, MediaType, DEFAULT_FILE_NAMING_TEMPLATE,
};
use crate::metrics::RunMetrics;
use crate::scroll::{
    BoundaryScrollManager, ScrollStats, DEFAULT_MAX_SCROLL_ATTEMPTS,
    DEFAULT_MIN_SCROLL_DISTANCE_PX,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Status markers that exclude a container from processing.
pub const STATUS_QUEUING: &str = "Queuing";
pub const STATUS_FAILED: &str = "Something went wrong";

/// Landmarks that must be visible before detail metadata is trusted.
pub const CREATION_TIME_LABEL: &str = "Creation Time";
pub const DETAIL_PANEL_LANDMARK: &str = "Image to video";

const EXTRACTION_ATTEMPTS: usize = 3;
const EXTRACTION_RETRY_DELAY: Duration = Duration::from_secs(1);
const DETAIL_READY_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_CAPTURE_TIMEOUT: Duration = Duration::from_secs(60);
const CLICK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateMode {
    /// Skip past duplicates via exit-scan-return and keep downloading.
    Skip,
    /// Stop cleanly at the first confirmed duplicate.
    Finish,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadManagerConfig {
    pub downloads_folder: PathBuf,
    pub logs_folder: PathBuf,
    pub max_downloads: usize,
    pub duplicate_mode: DuplicateMode,
    pub duplicate_check_enabled: bool,
    pub start_container_index: u64,
    /// Minimum pixels per scroll attempt. Values below 2000 break boundary
    /// detection on this gallery; they are warned about, never clamped.
    pub scroll_amount_px: f64,
    pub max_scroll_attempts: usize,
    pub thumbnail_selector: String,
    pub creation_time_selector: String,
    /// Primary selector first, then fallbacks.
    pub prompt_selectors: Vec<String>,
    pub download_icon_selectors: Vec<String>,
    pub watermark_option_text: String,
    pub close_icon_selectors: Vec<String>,
    pub start_from_datetime: Option<String>,
    pub min_prompt_length: usize,
    pub file_naming_template: String,
    /// Inserted verbatim into the filename template.
    pub unique_id: String,
    pub retry_failed_downloads: bool,
}

impl Default for DownloadManagerConfig {
    fn default() -> Self {
        Self {
            downloads_folder: PathBuf::from("downloads"),
            logs_folder: PathBuf::from("logs"),
            max_downloads: 100,
            duplicate_mode: DuplicateMode::Finish,
            duplicate_check_enabled: true,
            start_container_index: 8,
            scroll_amount_px: DEFAULT_MIN_SCROLL_DISTANCE_PX,
            max_scroll_attempts: DEFAULT_MAX_SCROLL_ATTEMPTS,
            thumbnail_selector: "img".to_string(),
            creation_time_selector: "span".to_string(),
            prompt_selectors: vec![
                "span[aria-describedby]".to_string(),
                "div.prompt-text span".to_string(),
            ],
            download_icon_selectors: vec![
                "[aria-label='Download']".to_string(),
                "span.download-icon".to_string(),
                "span:has(> svg)".to_string(),
            ],
            watermark_option_text: "Without Watermark".to_string(),
            close_icon_selectors: vec![
                "[aria-label='Close']".to_string(),
                ".close-icon".to_string(),
                ".modal-close".to_string(),
                "svg.close".to_string(),
            ],
            start_from_datetime: None,
            min_prompt_length: 50,
            file_naming_template: DEFAULT_FILE_NAMING_TEMPLATE.to_string(),
            unique_id: "gen".to_string(),
            retry_failed_downloads: false,
        }
    }
}

impl DownloadManagerConfig {
    pub fn from_action_value(value: &serde_json::Value) -> Result<Self, AutomationError> {
        serde_json::from_value(value.clone()).map_err(|e| {
            AutomationError::Malformed(format!("invalid generation-download configuration: {e}"))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerVerdict {
    DoneOk,
    DoneLimit,
    DoneEndOfGallery,
    DoneError,
}

#[derive(Debug, Clone)]
pub struct ManagerOutcome {
    pub verdict: ManagerVerdict,
    pub downloads_completed: usize,
    pub reason: String,
    pub scroll_stats: ScrollStats,
}

/// What to do with an extracted (datetime, prompt) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Download,
    /// FINISH mode hit known content; stop cleanly.
    Finish,
    /// SKIP mode hit known content; run exit-scan-return.
    ExitScanReturn,
}

/// Pure decision core of §duplicate handling. `known_duplicate` must already
/// exclude placeholder records (the log index guarantees that).
pub fn dedup_decision(
    check_enabled: bool,
    mode: DuplicateMode,
    known_duplicate: bool,
) -> DedupDecision {
    if !check_enabled || !known_duplicate {
        return DedupDecision::Download;
    }
    match mode {
        DuplicateMode::Finish => DedupDecision::Finish,
        DuplicateMode::Skip => DedupDecision::ExitScanReturn,
    }
}

/// A container's lightweight identity read straight off the gallery tile,
/// without opening the detail view.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerKey {
    pub creation_datetime: String,
    pub prompt: String,
}

/// Parse the visible text of a gallery container into its duplicate key.
/// The datetime is whichever line parses canonically; the prompt is the
/// longest remaining line. Tiles truncate the prompt, which is fine since
/// only the 100-char prefix is ever compared.
pub fn container_key_from_text(text: &str) -> Option<ContainerKey> {
    let mut datetime = None;
    let mut prompt = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == CREATION_TIME_LABEL {
            continue;
        }
        if datetime.is_none() && is_canonical_datetime(line) {
            datetime = Some(line.to_string());
            continue;
        }
        if line.chars().count() > prompt.chars().count() {
            prompt = line.to_string();
        }
    }

    Some(ContainerKey {
        creation_datetime: datetime?,
        prompt: strip_ellipsis(&prompt).to_string(),
    })
}

/// True when the tile is still generating or failed and must be skipped.
pub fn container_is_pending(text: &str) -> bool {
    text.contains(STATUS_QUEUING) || text.contains(STATUS_FAILED)
}

/// Index of the first scanned container whose key the log does not contain.
pub fn find_boundary(log: &DownloadLog, keys: &[(u64, ContainerKey)]) -> Option<u64> {
    keys.iter()
        .find(|(_, key)| !log.is_duplicate(&key.creation_datetime, &key.prompt))
        .map(|(index, _)| *index)
}

pub struct GenerationDownloadManager<'a> {
    driver: &'a BrowserDriver,
    config: DownloadManagerConfig,
    log: DownloadLog,
    scroll: BoundaryScrollManager<'a>,
    cancelled: Arc<AtomicBool>,
    metrics: Arc<RunMetrics>,
    downloads_completed: usize,
    skip_mode_active: bool,
    checkpoint: Option<DownloadLogEntry>,
}

impl<'a> GenerationDownloadManager<'a> {
    pub async fn new(
        driver: &'a BrowserDriver,
        config: DownloadManagerConfig,
        cancelled: Arc<AtomicBool>,
        metrics: Arc<RunMetrics>,
    ) -> Result<GenerationDownloadManager<'a>, AutomationError> {
        let log = DownloadLog::load(&config.logs_folder).await?;
        let checkpoint = log.checkpoint().cloned();
        if let Some(entry) = &checkpoint {
            info!(
                datetime = %entry.creation_datetime,
                sequence = entry.sequence_index,
                "resuming after last complete log entry"
            );
        }
        let scroll = BoundaryScrollManager::new(driver, config.scroll_amount_px);

        Ok(Self {
            driver,
            config,
            log,
            scroll,
            cancelled,
            metrics,
            downloads_completed: 0,
            skip_mode_active: false,
            checkpoint,
        })
    }

    pub fn downloads_completed(&self) -> usize {
        self.downloads_completed
    }

    /// Resume hint: the last complete entry seen at load time.
    pub fn checkpoint(&self) -> Option<&DownloadLogEntry> {
        self.checkpoint.as_ref()
    }

    /// Drive the state machine to one of its terminal states. Unrecoverable
    /// errors fold into a `DoneError` outcome; only cancellation escapes as
    /// an error.
    pub async fn run(mut self) -> Result<ManagerOutcome, AutomationError> {
        match self.run_inner().await {
            Ok(outcome) => Ok(outcome),
            Err(AutomationError::Cancelled) => Err(AutomationError::Cancelled),
            Err(e) => Ok(self.finish(ManagerVerdict::DoneError, e.to_string())),
        }
    }

    async fn run_inner(&mut self) -> Result<ManagerOutcome, AutomationError> {
        let mut index = self.config.start_container_index;
        if let Some(datetime) = self.config.start_from_datetime.clone() {
            if let Some(found) = self.start_from(&datetime).await? {
                index = found;
            }
        }

        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(AutomationError::Cancelled);
            }
            if self.downloads_completed >= self.config.max_downloads {
                return Ok(self.finish(
                    ManagerVerdict::DoneLimit,
                    format!("reached max_downloads={}", self.config.max_downloads),
                ));
            }

            let container = match self.container_at(index).await? {
                Some(container) => container,
                None => {
                    if !self.advance_gallery().await? {
                        return Ok(self.finish(
                            ManagerVerdict::DoneEndOfGallery,
                            "no further containers after scrolling".to_string(),
                        ));
                    }
                    continue;
                }
            };

            let tile_text = container.text().await;
            if container_is_pending(&tile_text) {
                debug!(index, "skipping in-progress or failed generation");
                index += 1;
                continue;
            }

            if !self.open_container(index).await? {
                warn!(index, "all click strategies failed, skipping container");
                index += 1;
                continue;
            }

            let metadata = match self.extract_detail_metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(index, error = %e, "metadata extraction failed, skipping");
                    self.exit_detail().await?;
                    index += 1;
                    continue;
                }
            };

            let known = self
                .log
                .is_duplicate(&metadata.creation_datetime, &metadata.prompt);
            match dedup_decision(self.config.duplicate_check_enabled, self.config.duplicate_mode, known)
            {
                DedupDecision::Finish => {
                    self.exit_detail().await.ok();
                    return Ok(self.finish(
                        ManagerVerdict::DoneOk,
                        "reached previously downloaded content".to_string(),
                    ));
                }
                DedupDecision::ExitScanReturn => {
                    self.skip_mode_active = true;
                    info!(
                        datetime = %metadata.creation_datetime,
                        "duplicate in SKIP mode, running exit-scan-return"
                    );
                    match self.exit_scan_return().await? {
                        Some(boundary) => {
                            index = boundary;
                            continue;
                        }
                        None => {
                            return Ok(self.finish(
                                ManagerVerdict::DoneEndOfGallery,
                                "no undownloaded boundary before end of gallery".to_string(),
                            ));
                        }
                    }
                }
                DedupDecision::Download => {}
            }

            match self.download_current(&metadata).await {
                Ok(entry) => {
                    self.log.append(entry).await?;
                    self.downloads_completed += 1;
                    self.metrics.record_download(true);
                }
                Err(e) => {
                    warn!(index, error = %e, "download failed, logging placeholder");
                    self.metrics.record_download(false);
                    self.log
                        .append(DownloadLogEntry::placeholder(
                            &metadata.creation_datetime,
                            &metadata.prompt,
                            "",
                        ))
                        .await?;
                    if self.config.retry_failed_downloads {
                        // Same container again on the next pass.
                        self.exit_detail().await?;
                        continue;
                    }
                }
            }

            self.exit_detail().await?;
            index += 1;
        }
    }

    fn finish(&self, verdict: ManagerVerdict, reason: String) -> ManagerOutcome {
        info!(
            ?verdict,
            reason = %reason,
            downloads = self.downloads_completed,
            skipped_duplicates = self.skip_mode_active,
            "download manager finished"
        );
        ManagerOutcome {
            verdict,
            downloads_completed: self.downloads_completed,
            reason,
            scroll_stats: self.scroll.stats().clone(),
        }
    }

    /// Locate the container whose id suffix is exactly `__index`.
    async fn container_at(
        &self,
        index: u64,
    ) -> Result<Option<ElementHandle>, AutomationError> {
        let suffix = format!("__{index}");
        let handles = self
            .driver
            .query_all(&format!("div[id$='{suffix}']"))
            .await?;
        for handle in handles {
            if let Some(id) = handle.dom_id().await {
                if crate::scroll::container_index(&id) == Some(index) {
                    return Ok(Some(handle));
                }
            }
        }
        Ok(None)
    }

    /// Scroll until new containers render; false once the gallery is done.
    async fn advance_gallery(&mut self) -> Result<bool, AutomationError> {
        for _ in 0..self.config.max_scroll_attempts {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(AutomationError::Cancelled);
            }
            let outcome = self.scroll.advance().await?;
            self.metrics.record_scroll(outcome.success);
            if outcome.success {
                return Ok(true);
            }
            if self.scroll.at_end_of_gallery() {
                return Ok(false);
            }
        }
        Ok(false)
    }

    /// The 5-rung click ladder for entering a container's detail view.
    async fn open_container(&self, index: u64) -> Result<bool, AutomationError> {
        let container_selector = format!("div[id$='__{index}']");
        let thumbnail_selector =
            format!("{container_selector} {}", self.config.thumbnail_selector);

        for (strategy, name) in [
            (0, "native click"),
            (1, "scroll into view + click"),
            (2, "scripted click"),
            (3, "scroll into view + scripted click"),
            (4, "dispatched event"),
        ] {
            let target = match self.driver.query(&thumbnail_selector).await? {
                Some(handle) => handle,
                None => match self.container_at(index).await? {
                    Some(handle) => handle,
                    None => return Ok(false),
                },
            };

            let clicked = match strategy {
                0 => target.click().await,
                1 => {
                    target.scroll_into_view().await.ok();
                    target.click().await
                }
                2 => target.js_click().await,
                3 => {
                    target.scroll_into_view().await.ok();
                    target.js_click().await
                }
                _ => target.dispatch_click().await,
            };

            if let Err(e) = clicked {
                debug!(index, strategy = name, "click failed: {e}");
                continue;
            }
            if self.wait_for_detail_ready().await {
                return Ok(true);
            }
            debug!(index, strategy = name, "click landed but detail never became ready");
        }

        Ok(false)
    }

    /// Detail readiness: both landmark texts visible and at least one prompt
    /// span present.
    async fn wait_for_detail_ready(&self) -> bool {
        let prompt_selector = self
            .config
            .prompt_selectors
            .first()
            .cloned()
            .unwrap_or_else(|| "span[aria-describedby]".to_string());
        let script = format!(
            "(() => {{ \
                const text = document.body ? document.body.innerText : ''; \
                return text.includes('{DETAIL_PANEL_LANDMARK}') \
                    && text.includes('{CREATION_TIME_LABEL}') \
                    && document.querySelector(\"{prompt_selector}\") !== null; \
            }})()"
        );

        let deadline = tokio::time::Instant::now() + DETAIL_READY_TIMEOUT;
        loop {
            if let Ok(value) = self.driver.evaluate(&script).await {
                if value.as_bool().unwrap_or(false) {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    /// Extract creation datetime and prompt from the open detail view, with
    /// retries for late DOM updates.
    async fn extract_detail_metadata(&self) -> Result<ContainerKey, AutomationError> {
        let mut last_problem = String::new();

        for attempt in 0..EXTRACTION_ATTEMPTS {
            if attempt > 0 {
                sleep(EXTRACTION_RETRY_DELAY).await;
            }

            let datetime = self.extract_creation_datetime().await;
            let prompt = self.extract_prompt().await;

            match (datetime, prompt) {
                (Some(datetime), Some(prompt)) => {
                    return Ok(ContainerKey {
                        creation_datetime: datetime,
                        prompt,
                    });
                }
                (datetime, prompt) => {
                    last_problem = format!(
                        "datetime {}, prompt {}",
                        if datetime.is_some() { "ok" } else { "missing" },
                        if prompt.is_some() { "ok" } else { "missing" }
                    );
                    debug!(attempt, problem = %last_problem, "extraction incomplete, retrying");
                }
            }
        }

        Err(AutomationError::ExtractionFailed(format!(
            "after {EXTRACTION_ATTEMPTS} attempts: {last_problem}"
        )))
    }

    /// Find every `Creation Time` label, read the sibling datetime, and take
    /// the candidate spatially closest to the detail panel. First-in-DOM
    /// order is wrong here: it picks the task-creation time.
    async fn extract_creation_datetime(&self) -> Option<String> {
        let script = format!(
            "(() => {{ \
                const out = []; \
                for (const el of document.querySelectorAll(\"{selector}\")) {{ \
                    if (el.innerText.trim() !== '{CREATION_TIME_LABEL}') continue; \
                    const sibling = el.nextElementSibling; \
                    const text = sibling ? sibling.innerText.trim() : ''; \
                    const rect = el.getBoundingClientRect(); \
                    out.push({{text, x: rect.x + rect.width / 2, y: rect.y + rect.height / 2}}); \
                }} \
                return out; \
            }})()",
            selector = self.config.creation_time_selector
        );

        let value = self.driver.evaluate(&script).await.ok()?;
        let raw = value.as_array()?;

        let mut candidates = Vec::new();
        let mut points = Vec::new();
        for item in raw {
            let text = item.get("text")?.as_str()?.trim().to_string();
            if !is_canonical_datetime(&text) {
                continue;
            }
            let x = item.get("x")?.as_f64()?;
            let y = item.get("y")?.as_f64()?;
            candidates.push(text);
            points.push((x, y));
        }

        let anchor = self.detail_anchor().await;
        let chosen = closest_candidate(&points, anchor)?;
        Some(candidates[chosen].clone())
    }

    /// Center of the active detail panel, approximated by the prompt span.
    async fn detail_anchor(&self) -> (f64, f64) {
        for selector in &self.config.prompt_selectors {
            if let Ok(Some(handle)) = self.driver.query(selector).await {
                if let Ok(point) = handle.center_point().await {
                    return point;
                }
            }
        }
        let value = self
            .driver
            .evaluate("[window.innerWidth / 2, window.innerHeight / 2]")
            .await
            .ok();
        value
            .as_ref()
            .and_then(|v| v.as_array())
            .and_then(|a| Some((a.first()?.as_f64()?, a.get(1)?.as_f64()?)))
            .unwrap_or((640.0, 360.0))
    }

    /// Try the prompt selectors in order; accept the first text that clears
    /// the minimum length after stripping the trailing ellipsis.
    async fn extract_prompt(&self) -> Option<String> {
        let min_len = self.config.min_prompt_length / 3;
        for selector in &self.config.prompt_selectors {
            for handle in self.driver.query_all(selector).await.ok()? {
                let text = handle.text().await;
                let cleaned = strip_ellipsis(&text).to_string();
                if cleaned.chars().count() > min_len {
                    return Some(cleaned);
                }
            }
        }
        None
    }

    /// Trigger the download menu, pick the watermark-free variant, capture
    /// the file, and rename it per the configured template.
    async fn download_current(
        &self,
        metadata: &ContainerKey,
    ) -> Result<DownloadLogEntry, AutomationError> {
        let icon = self
            .first_match(&self.config.download_icon_selectors)
            .await
            .ok_or_else(|| {
                AutomationError::DownloadFailed("download icon not found".to_string())
            })?;
        if icon.click().await.is_err() {
            icon.js_click().await?;
        }

        let option_text = self.config.watermark_option_text.clone();
        let captured = self
            .driver
            .download_next(
                move || async move { self.click_menu_option(&option_text).await },
                &self.config.downloads_folder,
                DOWNLOAD_CAPTURE_TIMEOUT,
            )
            .await?;

        let extension = captured
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_string();
        let media_type = MediaType::from_extension(&extension);
        let creation = parse_canonical_datetime(&metadata.creation_datetime)?;
        let filename = render_filename(
            &self.config.file_naming_template,
            media_type,
            &creation,
            &self.config.unique_id,
            &extension,
        );

        let target = self.config.downloads_folder.join(&filename);
        tokio::fs::rename(&captured, &target).await?;
        info!(file = %target.display(), "download stored");

        Ok(DownloadLogEntry::new(
            self.log.next_sequence_index(),
            &metadata.creation_datetime,
            &metadata.prompt,
            media_type.label(),
        ))
    }

    /// Wait for the options menu and click the entry carrying the given
    /// text.
    async fn click_menu_option(&self, text: &str) -> Result<(), AutomationError> {
        let script = format!(
            "(() => {{ \
                const needle = '{text}'; \
                for (const el of document.querySelectorAll('li, button, div[role=\"menuitem\"], span')) {{ \
                    if (el.innerText && el.innerText.trim().includes(needle)) {{ el.click(); return true; }} \
                }} \
                return false; \
            }})()"
        );

        let deadline = tokio::time::Instant::now() + CLICK_TIMEOUT;
        loop {
            let value = self.driver.evaluate(&script).await?;
            if value.as_bool().unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AutomationError::DownloadFailed(format!(
                    "menu option '{text}' never appeared"
                )));
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    async fn first_match(&self, selectors: &[String]) -> Option<ElementHandle> {
        for selector in selectors {
            if let Ok(Some(handle)) = self.driver.query(selector).await {
                if handle.is_visible().await {
                    return Some(handle);
                }
            }
        }
        None
    }

    /// Leave the detail view: ranked close-icon selectors first, browser
    /// back-navigation as the final fallback.
    async fn exit_detail(&self) -> Result<(), AutomationError> {
        for selector in &self.config.close_icon_selectors {
            if let Ok(Some(handle)) = self.driver.query(selector).await {
                if handle.click().await.is_ok() || handle.js_click().await.is_ok() {
                    sleep(Duration::from_millis(300)).await;
                    return Ok(());
                }
            }
        }

        warn!("close icon unavailable, falling back to back-navigation");
        self.driver.back().await.map_err(|e| {
            AutomationError::Internal(format!("cannot leave detail view: {e}"))
        })?;
        sleep(Duration::from_millis(500)).await;
        Ok(())
    }

    /// Exit-scan-return: after a duplicate in SKIP mode, walk the gallery
    /// from the configured start index, compare every tile to the log, and
    /// re-enter at the first unknown one.
    async fn exit_scan_return(&mut self) -> Result<Option<u64>, AutomationError> {
        self.exit_detail().await?;

        let mut scroll_rounds = 0;
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(AutomationError::Cancelled);
            }

            let keys = self.scan_visible_keys().await?;
            if let Some(boundary) = find_boundary(&self.log, &keys) {
                debug!(boundary, "boundary container found");
                if !self.open_container(boundary).await? {
                    warn!(boundary, "could not re-enter boundary container");
                    return Ok(None);
                }
                if let Ok(metadata) = self.extract_detail_metadata().await {
                    let expected = keys
                        .iter()
                        .find(|(index, _)| *index == boundary)
                        .map(|(_, key)| key.creation_datetime.clone());
                    if expected.as_deref() != Some(metadata.creation_datetime.as_str()) {
                        warn!(
                            boundary,
                            expected = expected.as_deref().unwrap_or("-"),
                            actual = %metadata.creation_datetime,
                            "re-entered a different item than scanned"
                        );
                    }
                }
                self.exit_detail().await?;
                return Ok(Some(boundary));
            }

            scroll_rounds += 1;
            if scroll_rounds > self.config.max_scroll_attempts || !self.advance_gallery().await? {
                return Ok(None);
            }
        }
    }

    /// Lightweight sweep: read every visible container's text and parse its
    /// duplicate key, no detail clicks.
    async fn scan_visible_keys(&self) -> Result<Vec<(u64, ContainerKey)>, AutomationError> {
        let ids = self.scroll.container_ids().await?;
        let mut indexed: Vec<u64> = ids
            .iter()
            .filter_map(|id| crate::scroll::container_index(id))
            .filter(|index| *index >= self.config.start_container_index)
            .collect();
        indexed.sort_unstable();
        indexed.dedup();

        let mut keys = Vec::new();
        for index in indexed {
            if let Some(handle) = self.container_at(index).await? {
                let text = handle.text().await;
                if container_is_pending(&text) {
                    continue;
                }
                if let Some(key) = container_key_from_text(&text) {
                    keys.push((index, key));
                }
            }
        }
        Ok(keys)
    }

    /// Start-from mode: scroll the main gallery until a container shows the
    /// exact requested datetime, and hand its index to the normal loop.
    /// When the datetime never appears, processing continues with whatever
    /// the main page shows; a thumbnails view is never entered.
    async fn start_from(&mut self, datetime: &str) -> Result<Option<u64>, AutomationError> {
        info!(datetime, "searching for start-from container");

        let mut rounds = 0;
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(AutomationError::Cancelled);
            }

            let keys = self.scan_visible_keys().await?;
            if let Some((index, _)) = keys
                .iter()
                .find(|(_, key)| key.creation_datetime == datetime)
            {
                info!(index, "start-from container found");
                return Ok(Some(*index));
            }

            rounds += 1;
            if rounds > self.config.max_scroll_attempts || !self.advance_gallery().await? {
                warn!(
                    datetime,
                    "start-from datetime not found, continuing in generation-container mode"
                );
                return Ok(None);
            }
        }
    }
}
