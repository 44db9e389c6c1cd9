//! Boundary scroll management for the virtualized gallery list
//!
//! The gallery renders a moving window of containers whose DOM ids end in
//! `__N`. Advancing the window requires real scroll displacement; a scroll
//! that moves fewer pixels than the configured floor tends to leave the
//! container set unchanged and stalls the crawl. Two strategies are tried in
//! order, both verified against this gallery: `scrollIntoView` on the last
//! observed container, then a direct `scrollTop` push on the scroll
//! container.

use crate::browser::BrowserDriver;
use crate::error::AutomationError;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub const DEFAULT_MIN_SCROLL_DISTANCE_PX: f64 = 2500.0;
pub const DEFAULT_MAX_SCROLL_ATTEMPTS: usize = 5;

/// Container enumeration must use the id-suffix family; a generic selector
/// famously matched nothing while the page kept scrolling.
pub const CONTAINER_INDEX_PROBE_LIMIT: usize = 50;

pub fn container_family_selector() -> String {
    (0..CONTAINER_INDEX_PROBE_LIMIT)
        .map(|index| format!("div[id$='__{index}']"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Numeric index from a container id ending in `__N`.
pub fn container_index(id: &str) -> Option<u64> {
    id.rsplit_once("__")?.1.parse().ok()
}

#[derive(Debug, Clone, Default)]
pub struct ScrollStats {
    pub attempts: u64,
    pub total_pixels: f64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone)]
pub struct ScrollOutcome {
    pub success: bool,
    pub displacement_px: f64,
    pub new_container_ids: Vec<String>,
}

/// Success requires real displacement and evidence the window moved: new
/// containers appeared or the scroll offset meaningfully advanced.
pub fn scroll_succeeded(
    displacement_px: f64,
    min_distance_px: f64,
    new_container_count: usize,
    offset_advanced: bool,
) -> bool {
    displacement_px >= min_distance_px && (new_container_count > 0 || offset_advanced)
}

pub struct BoundaryScrollManager<'a> {
    driver: &'a BrowserDriver,
    min_scroll_distance_px: f64,
    consecutive_failures: usize,
    last_container_set: BTreeSet<String>,
    stats: ScrollStats,
}

impl<'a> BoundaryScrollManager<'a> {
    pub fn new(driver: &'a BrowserDriver, min_scroll_distance_px: f64) -> Self {
        if min_scroll_distance_px < 2000.0 {
            // Never clamped silently; small distances break boundary
            // detection on this gallery.
            warn!(
                configured = min_scroll_distance_px,
                floor = 2000.0,
                "configured scroll distance is below the verified floor"
            );
        }
        Self {
            driver,
            min_scroll_distance_px,
            consecutive_failures: 0,
            last_container_set: BTreeSet::new(),
            stats: ScrollStats::default(),
        }
    }

    pub fn stats(&self) -> &ScrollStats {
        &self.stats
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Two consecutive non-advancing attempts mean the gallery is exhausted.
    pub fn at_end_of_gallery(&self) -> bool {
        self.consecutive_failures >= 2
    }

    /// Snapshot the ids of currently rendered containers.
    pub async fn container_ids(&self) -> Result<BTreeSet<String>, AutomationError> {
        let selector = container_family_selector();
        let script = format!(
            "Array.from(document.querySelectorAll(\"{selector}\")).map(el => el.id)"
        );
        let value = self.driver.evaluate(&script).await?;
        let ids = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    /// Advance the list by at least the configured distance.
    pub async fn advance(&mut self) -> Result<ScrollOutcome, AutomationError> {
        let before_ids = self.container_ids().await?;
        let before_offset = self.scroll_offset().await?;

        let mut displacement = self.scroll_into_last_container().await?;
        if displacement < self.min_scroll_distance_px {
            debug!(
                displacement,
                target = self.min_scroll_distance_px,
                "scrollIntoView fell short, pushing scrollTop"
            );
            displacement += self.push_scroll_top().await?;
        }

        let after_ids = self.container_ids().await?;
        let after_offset = self.scroll_offset().await?;

        let new_container_ids: Vec<String> =
            after_ids.difference(&before_ids).cloned().collect();
        let offset_advanced = after_offset - before_offset >= 1.0;
        let success = scroll_succeeded(
            displacement,
            self.min_scroll_distance_px,
            new_container_ids.len(),
            offset_advanced,
        );

        self.stats.attempts += 1;
        self.stats.total_pixels += displacement.max(0.0);
        if success {
            self.stats.successes += 1;
            self.consecutive_failures = 0;
        } else {
            self.stats.failures += 1;
            self.consecutive_failures += 1;
        }

        info!(
            displacement,
            new_containers = new_container_ids.len(),
            success,
            consecutive_failures = self.consecutive_failures,
            "scroll attempt"
        );

        self.last_container_set = after_ids;
        Ok(ScrollOutcome {
            success,
            displacement_px: displacement,
            new_container_ids,
        })
    }

    /// Strategy 1: scroll the last observed container into view and report
    /// how far the offset moved.
    async fn scroll_into_last_container(&self) -> Result<f64, AutomationError> {
        let before = self.scroll_offset().await?;

        let observed = if self.last_container_set.is_empty() {
            self.container_ids().await?
        } else {
            self.last_container_set.clone()
        };
        let last_id = match observed
            .into_iter()
            .max_by_key(|id| container_index(id).unwrap_or(0))
        {
            Some(id) => id,
            None => return Ok(0.0),
        };

        let selector = format!("div[id='{last_id}']");
        if let Some(handle) = self.driver.query(&selector).await? {
            handle.scroll_into_view().await?;
        }

        let after = self.scroll_offset().await?;
        Ok((after - before).max(0.0))
    }

    /// Strategy 2: push scrollTop on the identified scroll container.
    async fn push_scroll_top(&self) -> Result<f64, AutomationError> {
        let script = format!(
            "(() => {{ \
                let target = document.scrollingElement; \
                let best = 0; \
                for (const el of document.querySelectorAll('div')) {{ \
                    const room = el.scrollHeight - el.clientHeight; \
                    if (room > best) {{ best = room; target = el; }} \
                }} \
                if (!target) return 0; \
                const before = target.scrollTop; \
                target.scrollTop = before + {distance}; \
                return target.scrollTop - before; \
            }})()",
            distance = self.min_scroll_distance_px
        );
        let value = self.driver.evaluate(&script).await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn scroll_offset(&self) -> Result<f64, AutomationError> {
        let script = "(() => { \
            let max = document.scrollingElement ? document.scrollingElement.scrollTop : 0; \
            for (const el of document.querySelectorAll('div')) { \
                if (el.scrollTop > max) max = el.scrollTop; \
            } \
            return max; \
        })()";
        let value = self.driver.evaluate(script).await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }
}
