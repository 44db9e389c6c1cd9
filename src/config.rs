//! Configuration loading and browser launch settings
//!
//! A configuration file (JSON or YAML, interchangeable) describes one
//! automation: the target URL, browser settings and the action program.
//! Unknown top-level keys are preserved across load/convert but otherwise
//! ignored.

use crate::action::{Action, ActionKind};
use crate::error::AutomationError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

pub const ENV_HEADLESS: &str = "AUTOMATON_HEADLESS";
pub const ENV_BROWSER_PATH: &str = "AUTOMATON_BROWSER_PATH";
pub const ENV_DOWNLOAD_DIR: &str = "AUTOMATON_DOWNLOAD_DIR";
pub const ENV_LOG_LEVEL: &str = "AUTOMATON_LOG_LEVEL";

/// Browser viewport for the automation run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// One automation: browser settings plus the action program.
///
/// # Examples
///
/// ```rust
/// use automaton::AutomationConfig;
///
/// let config = AutomationConfig::skeleton("my-run", "https://example.com");
/// assert!(config.headless);
/// assert!(!config.actions.is_empty());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationConfig {
    pub name: String,

    /// Initial URL the run navigates to before the first action.
    pub url: String,

    /// Run Chrome without a visible window (default: true)
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default)]
    pub viewport: Viewport,

    /// Leave the browser open after a successful headed run (default: false)
    #[serde(default)]
    pub keep_browser_open: bool,

    #[serde(default)]
    pub actions: Vec<Action>,

    /// Names of credentials resolved by the host; only the shape matters
    /// here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_references: Option<Vec<String>>,

    /// Path to the Chrome/Chromium executable (default: auto-detect)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_path: Option<String>,

    /// Default directory for DOWNLOAD_FILE and the download manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,

    /// Unknown top-level keys, preserved across load/convert.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_headless() -> bool {
    true
}

impl AutomationConfig {
    /// Load a configuration from a JSON or YAML file, chosen by extension.
    pub async fn load(path: &Path) -> Result<Self, AutomationError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            AutomationError::Internal(format!("cannot read {}: {e}", path.display()))
        })?;

        let mut config = Self::from_str_for(path, &text)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_str_for(path: &Path, text: &str) -> Result<Self, AutomationError> {
        if is_yaml_path(path) {
            Ok(serde_yaml::from_str(text)?)
        } else {
            Ok(serde_json::from_str(text)?)
        }
    }

    pub fn to_string_for(&self, path: &Path) -> Result<String, AutomationError> {
        if is_yaml_path(path) {
            Ok(serde_yaml::to_string(self)?)
        } else {
            let mut text = serde_json::to_string_pretty(self)?;
            text.push('\n');
            Ok(text)
        }
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.name.trim().is_empty() {
            return Err(AutomationError::Malformed("name must not be empty".into()));
        }
        url::Url::parse(&self.url)
            .map_err(|e| AutomationError::Malformed(format!("invalid url '{}': {e}", self.url)))?;
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(AutomationError::Malformed(
                "viewport dimensions must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Environment overrides recognized by the CLI surface.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(headless) = std::env::var(ENV_HEADLESS) {
            self.headless = matches!(headless.trim(), "1" | "true" | "TRUE" | "yes");
        }
        if let Ok(path) = std::env::var(ENV_BROWSER_PATH) {
            if !path.trim().is_empty() {
                self.browser_path = Some(path);
            }
        }
        if let Ok(dir) = std::env::var(ENV_DOWNLOAD_DIR) {
            if !dir.trim().is_empty() {
                self.download_dir = Some(dir);
            }
        }
    }

    /// Starter configuration emitted by `automaton create`.
    pub fn skeleton(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            headless: true,
            viewport: Viewport::default(),
            keep_browser_open: false,
            actions: vec![
                Action::new(ActionKind::WaitForElement).with_selector("body"),
                {
                    let mut log = Action::new(ActionKind::LogMessage)
                        .with_value(json!({"text": "page loaded", "level": "info"}));
                    log.description = Some("replace with your own steps".into());
                    log
                },
            ],
            credential_references: None,
            browser_path: None,
            download_dir: None,
            extra: serde_json::Map::new(),
        }
    }
}

fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Chrome command-line arguments for an automation run.
///
/// One unique profile directory per run keeps concurrent tools from fighting
/// over Chrome's singleton lock, and the download-related flags let the
/// download manager capture files without prompts.
pub fn get_chrome_args(config: &AutomationConfig) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-popup-blocking".to_string(),
        "--safebrowsing-disable-download-protection".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir=/tmp/automaton-profile-{unique_id}"),
    ];

    if config.headless {
        args.push("--headless".to_string());
    }

    args
}

pub fn create_browser_config(
    config: &AutomationConfig,
) -> Result<chromiumoxide::browser::BrowserConfig, AutomationError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config));

    if !config.headless {
        builder = builder.with_head();
    }

    let executable = config
        .browser_path
        .clone()
        .or_else(detect_chrome_executable);
    if let Some(path) = executable {
        builder = builder.chrome_executable(path);
    }

    builder
        .build()
        .map_err(|e| AutomationError::Internal(format!("browser configuration failed: {e}")))
}

/// Known install locations, probed when no explicit path is configured.
pub fn detect_chrome_executable() -> Option<String> {
    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(|candidate| candidate.to_string())
}
