//! Append-only download log and its in-memory duplicate index
//!
//! The log lives at `<logs_folder>/generation_downloads.txt`. Each record is
//! exactly four lines: a `#`-prefixed 9-digit sequence id, the canonical
//! creation datetime, the prompt text, and a 40-character `=` separator.
//! Records written with the placeholder id mark a failed attempt and are
//! kept in the file but never enter the duplicate index.

use crate::error::AutomationError;
use crate::metadata::{is_canonical_datetime, prompt_prefix};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub const LOG_FILE_NAME: &str = "generation_downloads.txt";
pub const PLACEHOLDER_FILE_ID: &str = "#999999999";
pub const PLACEHOLDER_SEQUENCE: u64 = 999_999_999;
pub const RECORD_SEPARATOR: &str = "========================================";

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadLogEntry {
    pub file_id: String,
    /// Canonical `DD Mon YYYY HH:MM:SS` string.
    pub creation_datetime: String,
    pub prompt: String,
    /// Known for entries appended this run; empty when parsed back from the
    /// file (the on-disk format does not carry it).
    pub media_type: String,
    pub sequence_index: u64,
}

impl DownloadLogEntry {
    pub fn new(
        sequence_index: u64,
        creation_datetime: impl Into<String>,
        prompt: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            file_id: format!("#{sequence_index:09}"),
            creation_datetime: creation_datetime.into(),
            prompt: prompt.into(),
            media_type: media_type.into(),
            sequence_index,
        }
    }

    pub fn placeholder(
        creation_datetime: impl Into<String>,
        prompt: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            file_id: PLACEHOLDER_FILE_ID.to_string(),
            creation_datetime: creation_datetime.into(),
            prompt: prompt.into(),
            media_type: media_type.into(),
            sequence_index: PLACEHOLDER_SEQUENCE,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.file_id == PLACEHOLDER_FILE_ID
    }

    /// Duplicate-key comparison: same canonical datetime and the same first
    /// 100 prompt characters.
    pub fn matches(&self, creation_datetime: &str, prompt: &str) -> bool {
        self.creation_datetime == creation_datetime
            && prompt_prefix(&self.prompt) == prompt_prefix(prompt)
    }

    fn format_record(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n",
            self.file_id, self.creation_datetime, self.prompt, RECORD_SEPARATOR
        )
    }
}

/// Parse the whole log text into entries. Blocks that do not follow the
/// four-line shape are skipped with a warning rather than failing the run.
pub fn parse_log(text: &str) -> Vec<DownloadLogEntry> {
    let mut entries = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim_end() == RECORD_SEPARATOR {
            if let Some(entry) = parse_block(&block) {
                entries.push(entry);
            } else if !block.is_empty() {
                warn!(lines = block.len(), "skipping malformed download log record");
            }
            block.clear();
        } else {
            block.push(line);
        }
    }

    if !block.iter().all(|l| l.trim().is_empty()) {
        warn!("download log ends with an unterminated record; ignoring it");
    }

    entries
}

fn parse_block(block: &[&str]) -> Option<DownloadLogEntry> {
    if block.len() < 3 {
        return None;
    }
    let file_id = block[0].trim();
    let creation_datetime = block[1].trim();
    if !file_id.starts_with('#') || !is_canonical_datetime(creation_datetime) {
        return None;
    }
    let sequence_index: u64 = file_id[1..].parse().ok()?;
    // The prompt may itself contain newlines; everything after the datetime
    // belongs to it.
    let prompt = block[2..].join("\n");

    Some(DownloadLogEntry {
        file_id: file_id.to_string(),
        creation_datetime: creation_datetime.to_string(),
        prompt,
        media_type: String::new(),
        sequence_index,
    })
}

/// The append-only log plus the duplicate index built from it at run start.
#[derive(Debug)]
pub struct DownloadLog {
    path: PathBuf,
    entries: Vec<DownloadLogEntry>,
    /// creation datetime -> latest complete entry. Placeholders never enter.
    index: HashMap<String, DownloadLogEntry>,
}

impl DownloadLog {
    /// Load (or start) the log under `logs_folder`. A missing file is an
    /// empty log, not an error.
    pub async fn load(logs_folder: &Path) -> Result<Self, AutomationError> {
        tokio::fs::create_dir_all(logs_folder).await?;
        let path = logs_folder.join(LOG_FILE_NAME);

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(text) => parse_log(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut index = HashMap::new();
        for entry in &entries {
            if !entry.is_placeholder() {
                index.insert(entry.creation_datetime.clone(), entry.clone());
            }
        }

        debug!(
            path = %path.display(),
            records = entries.len(),
            indexed = index.len(),
            "download log loaded"
        );

        Ok(Self {
            path,
            entries,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[DownloadLogEntry] {
        &self.entries
    }

    /// Next sequence id, strictly above every complete entry already logged.
    pub fn next_sequence_index(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| !e.is_placeholder())
            .map(|e| e.sequence_index)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Most recent complete entry, used as the resume hint for SKIP mode.
    pub fn checkpoint(&self) -> Option<&DownloadLogEntry> {
        self.entries.iter().rev().find(|e| !e.is_placeholder())
    }

    pub fn lookup(&self, creation_datetime: &str) -> Option<&DownloadLogEntry> {
        self.index.get(creation_datetime)
    }

    /// True when a complete record with the same composite key exists.
    /// Placeholder records never count.
    pub fn is_duplicate(&self, creation_datetime: &str, prompt: &str) -> bool {
        self.lookup(creation_datetime)
            .is_some_and(|entry| entry.matches(creation_datetime, prompt))
    }

    /// Append a record and keep the in-memory index coherent so later
    /// duplicate checks in the same run see it.
    pub async fn append(&mut self, entry: DownloadLogEntry) -> Result<(), AutomationError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.format_record().as_bytes()).await?;
        file.flush().await?;

        if !entry.is_placeholder() {
            self.index
                .insert(entry.creation_datetime.clone(), entry.clone());
        }
        self.entries.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn log_in(dir: &Path) -> DownloadLog {
        DownloadLog::load(dir).await.unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_append_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = log_in(dir.path()).await;

        log.append(DownloadLogEntry::new(
            1,
            "03 Sep 2025 16:15:18",
            "A cinematic shot of a rainy street",
            "vid",
        ))
        .await
        .unwrap();
        log.append(DownloadLogEntry::new(
            2,
            "04 Sep 2025 08:00:00",
            "A quiet mountain lake at dawn",
            "img",
        ))
        .await
        .unwrap();

        let reloaded = log_in(dir.path()).await;
        assert_eq!(reloaded.entries().len(), 2);
        assert_eq!(reloaded.entries()[0].file_id, "#000000001");
        assert_eq!(reloaded.entries()[1].sequence_index, 2);
        assert_eq!(reloaded.next_sequence_index(), 3);
        assert!(reloaded.is_duplicate(
            "03 Sep 2025 16:15:18",
            "A cinematic shot of a rainy street"
        ));
    }

    #[tokio::test]
    async fn test_record_format_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = log_in(dir.path()).await;
        log.append(DownloadLogEntry::new(7, "03 Sep 2025 16:15:18", "prompt", "vid"))
            .await
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(
            text,
            format!("#000000007\n03 Sep 2025 16:15:18\nprompt\n{RECORD_SEPARATOR}\n")
        );
        assert_eq!(RECORD_SEPARATOR.len(), 40);
        assert!(RECORD_SEPARATOR.chars().all(|c| c == '='));
    }

    #[tokio::test]
    async fn test_placeholder_is_persisted_but_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = log_in(dir.path()).await;
        log.append(DownloadLogEntry::placeholder(
            "03 Sep 2025 16:15:18",
            "A cinematic shot",
            "vid",
        ))
        .await
        .unwrap();

        // Same key again in the same run: not a duplicate.
        assert!(!log.is_duplicate("03 Sep 2025 16:15:18", "A cinematic shot"));

        // And after reload: the record survives in the file yet stays
        // invisible to the index.
        let reloaded = log_in(dir.path()).await;
        assert_eq!(reloaded.entries().len(), 1);
        assert!(reloaded.entries()[0].is_placeholder());
        assert!(!reloaded.is_duplicate("03 Sep 2025 16:15:18", "A cinematic shot"));
        assert!(reloaded.lookup("03 Sep 2025 16:15:18").is_none());
    }

    #[tokio::test]
    async fn test_complete_entry_shadows_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = log_in(dir.path()).await;
        log.append(DownloadLogEntry::placeholder(
            "03 Sep 2025 16:15:18",
            "A cinematic shot",
            "vid",
        ))
        .await
        .unwrap();
        log.append(DownloadLogEntry::new(
            1,
            "03 Sep 2025 16:15:18",
            "A cinematic shot",
            "vid",
        ))
        .await
        .unwrap();

        assert!(log.is_duplicate("03 Sep 2025 16:15:18", "A cinematic shot"));
        // The placeholder does not influence the next sequence id.
        assert_eq!(log.next_sequence_index(), 2);
        assert_eq!(log.checkpoint().unwrap().sequence_index, 1);
    }

    #[tokio::test]
    async fn test_prompt_prefix_match_is_100_chars() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = log_in(dir.path()).await;

        let base: String = "x".repeat(100);
        log.append(DownloadLogEntry::new(
            1,
            "03 Sep 2025 16:15:18",
            format!("{base} original tail"),
            "vid",
        ))
        .await
        .unwrap();

        // Same first 100 chars, different tail: duplicate.
        assert!(log.is_duplicate("03 Sep 2025 16:15:18", &format!("{base} different tail")));
        // Different within the first 100 chars: not a duplicate.
        let mut changed = base.clone();
        changed.replace_range(0..1, "y");
        assert!(!log.is_duplicate("03 Sep 2025 16:15:18", &changed));
    }

    #[test]
    fn test_parse_skips_malformed_blocks() {
        let text = format!(
            "not an id\nalso not a datetime\n{RECORD_SEPARATOR}\n#000000001\n03 Sep 2025 16:15:18\nfine\n{RECORD_SEPARATOR}\n"
        );
        let entries = parse_log(&text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prompt, "fine");
    }

    #[test]
    fn test_parse_multiline_prompt() {
        let text = format!(
            "#000000004\n01 Jan 2026 00:00:01\nline one\nline two\n{RECORD_SEPARATOR}\n"
        );
        let entries = parse_log(&text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prompt, "line one\nline two");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(dir.path()).await;
        assert!(log.entries().is_empty());
        assert_eq!(log.next_sequence_index(), 1);
        assert!(log.checkpoint().is_none());
    }
}
