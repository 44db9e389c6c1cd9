//! Metadata extraction helpers and the download file-naming convention
//!
//! The gallery's detail panel exposes a creation datetime in the canonical
//! `DD Mon YYYY HH:MM:SS` form and a prompt that may arrive truncated with a
//! trailing ellipsis. Everything here is pure so the decision logic stays
//! testable without a browser.

use crate::error::AutomationError;
use chrono::NaiveDateTime;

pub const CANONICAL_DATETIME_FORMAT: &str = "%d %b %Y %H:%M:%S";

/// Prompt comparisons use the first 100 characters only.
pub const PROMPT_PREFIX_CHARS: usize = 100;

pub fn parse_canonical_datetime(text: &str) -> Result<NaiveDateTime, AutomationError> {
    NaiveDateTime::parse_from_str(text.trim(), CANONICAL_DATETIME_FORMAT).map_err(|e| {
        AutomationError::ExtractionFailed(format!("'{text}' is not a canonical datetime: {e}"))
    })
}

pub fn is_canonical_datetime(text: &str) -> bool {
    parse_canonical_datetime(text).is_ok()
}

/// Canonical datetime rendered for filenames: `YYYY-MM-DD-HH-MM-SS`.
pub fn datetime_for_filename(datetime: &NaiveDateTime) -> String {
    datetime.format("%Y-%m-%d-%H-%M-%S").to_string()
}

/// Drop a trailing ellipsis (either `…` or `...`) left by the panel's text
/// truncation.
pub fn strip_ellipsis(prompt: &str) -> &str {
    let trimmed = prompt.trim_end();
    if let Some(stripped) = trimmed.strip_suffix('…') {
        return stripped.trim_end();
    }
    if let Some(stripped) = trimmed.strip_suffix("...") {
        return stripped.trim_end();
    }
    trimmed
}

/// First 100 characters of a prompt, the second half of the duplicate key.
pub fn prompt_prefix(prompt: &str) -> String {
    prompt.chars().take(PROMPT_PREFIX_CHARS).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Image,
}

impl MediaType {
    /// Inferred from the downloaded file's extension; used only for naming.
    pub fn from_extension(extension: &str) -> MediaType {
        match extension.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "gif" => MediaType::Image,
            _ => MediaType::Video,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaType::Video => "vid",
            MediaType::Image => "img",
        }
    }
}

pub const DEFAULT_FILE_NAMING_TEMPLATE: &str = "{media_type}_{creation_date}_{unique_id}";

/// Render the download filename from the configured template.
///
/// The configured `unique_id` is inserted verbatim before the stem is
/// narrowed to the filename alphabet.
pub fn render_filename(
    template: &str,
    media_type: MediaType,
    creation: &NaiveDateTime,
    unique_id: &str,
    extension: &str,
) -> String {
    let stem = template
        .replace("{media_type}", media_type.label())
        .replace("{creation_date}", &datetime_for_filename(creation))
        .replace("{unique_id}", unique_id);

    let stem = sanitize_filename(&stem);
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}

/// Restrict a filename stem to the template's alphabet.
///
/// Rendered stems are `vid`/`img`, a dash-separated datetime, and the
/// configured unique id, so only the id can smuggle in path separators,
/// whitespace or control characters; anything outside the alphabet becomes
/// an underscore.
pub fn sanitize_filename(input: &str) -> String {
    input
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Center-to-center distance between two bounding-box centers.
pub fn center_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Index of the candidate spatially closest to the anchor point.
///
/// Landmark labels like `Creation Time` can occur several times on the page;
/// picking the first match in DOM order yields the wrong (task-creation)
/// datetime, so callers pass the active detail panel's center as anchor.
pub fn closest_candidate(candidates: &[(f64, f64)], anchor: (f64, f64)) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            center_distance(**a, anchor)
                .partial_cmp(&center_distance(**b, anchor))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_datetime_round_trip() {
        let parsed = parse_canonical_datetime("03 Sep 2025 16:15:18").unwrap();
        assert_eq!(
            parsed.format(CANONICAL_DATETIME_FORMAT).to_string(),
            "03 Sep 2025 16:15:18"
        );
        assert!(parse_canonical_datetime("2025-09-03 16:15:18").is_err());
        assert!(parse_canonical_datetime("garbage").is_err());
    }

    #[test]
    fn test_datetime_for_filename() {
        let parsed = parse_canonical_datetime("04 Sep 2025 08:00:00").unwrap();
        assert_eq!(datetime_for_filename(&parsed), "2025-09-04-08-00-00");
    }

    #[test]
    fn test_strip_ellipsis() {
        assert_eq!(strip_ellipsis("A cinematic shot…"), "A cinematic shot");
        assert_eq!(strip_ellipsis("A cinematic shot..."), "A cinematic shot");
        assert_eq!(strip_ellipsis("A cinematic shot"), "A cinematic shot");
        assert_eq!(strip_ellipsis("trailing space… "), "trailing space");
    }

    #[test]
    fn test_prompt_prefix_char_safe() {
        let long: String = "é".repeat(150);
        let prefix = prompt_prefix(&long);
        assert_eq!(prefix.chars().count(), 100);
        assert_eq!(prompt_prefix("short"), "short");
    }

    #[test]
    fn test_media_type_inference() {
        assert_eq!(MediaType::from_extension("mp4"), MediaType::Video);
        assert_eq!(MediaType::from_extension("webm"), MediaType::Video);
        assert_eq!(MediaType::from_extension("PNG"), MediaType::Image);
        assert_eq!(MediaType::from_extension("jpeg"), MediaType::Image);
    }

    #[test]
    fn test_render_filename_preserves_unique_id() {
        let creation = parse_canonical_datetime("03 Sep 2025 16:15:18").unwrap();
        let name = render_filename(
            DEFAULT_FILE_NAMING_TEMPLATE,
            MediaType::Video,
            &creation,
            "project_x",
            "mp4",
        );
        // The configured id must appear verbatim, not a hard-coded prefix.
        assert_eq!(name, "vid_2025-09-03-16-15-18_project_x.mp4");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b:c?.mp4"), "a_b_c_.mp4");
        assert_eq!(sanitize_filename("clean-name.mp4"), "clean-name.mp4");
        // A configured id with spaces or exotic characters still yields one
        // flat path component.
        assert_eq!(sanitize_filename(" my id "), "my_id");
        assert_eq!(sanitize_filename("sér\u{7}ie"), "s_r_ie");
    }

    #[test]
    fn test_closest_candidate_prefers_geometry_over_order() {
        let candidates = vec![(10.0, 10.0), (500.0, 480.0), (900.0, 900.0)];
        // Anchor near the second candidate; DOM order would pick the first.
        assert_eq!(closest_candidate(&candidates, (520.0, 500.0)), Some(1));
        assert_eq!(closest_candidate(&[], (0.0, 0.0)), None);
    }
}
