//! The action interpreter
//!
//! Executes a resolved program action by action. Handlers may take control
//! of the instruction pointer by clearing `should_increment`; everything
//! else advances linearly. Error propagation order on a handler failure:
//! STOP_AUTOMATION terminates the run, an open TRY frame catches, a
//! `continue_on_error` action records and advances, anything else fails the
//! run.

use crate::action::{Action, ActionKind};
use crate::browser::{BrowserDriver, WaitState};
use crate::condition::Condition;
use crate::context::{BlockFrame, BlockKind, ExecutionContext, RecordedError, VarValue};
use crate::error::{AutomationError, FailureSummary};
use crate::flow::ResolvedProgram;
use crate::gallery::{
    DownloadManagerConfig, GenerationDownloadManager, ManagerOutcome, ManagerVerdict,
};
use crate::metrics::RunMetrics;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const MAX_CONDITIONAL_WAIT_DELAY: Duration = Duration::from_secs(30);

/// Final report of a run; carries the exit contract to the host process.
#[derive(Debug)]
pub struct RunOutcome {
    pub success: bool,
    pub stop_reason: Option<String>,
    pub download_requested: bool,
    pub downloads_completed: usize,
    pub download_verdict: Option<ManagerVerdict>,
    pub errors: Vec<RecordedError>,
    pub variables: HashMap<String, VarValue>,
}

impl RunOutcome {
    /// Exit code for the scheduler: zero only on contract success.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

pub struct Interpreter {
    program: ResolvedProgram,
    context: ExecutionContext,
    driver: Option<BrowserDriver>,
    metrics: Arc<RunMetrics>,
    continue_on_error_all: bool,
    default_timeout_ms: Option<u64>,
    default_download_dir: Option<PathBuf>,
    download_outcome: Option<ManagerOutcome>,
    download_requested: bool,
    stop_reason: Option<String>,
}

impl Interpreter {
    pub fn new(program: ResolvedProgram) -> Self {
        Self {
            program,
            context: ExecutionContext::new(),
            driver: None,
            metrics: RunMetrics::shared(),
            continue_on_error_all: false,
            default_timeout_ms: None,
            default_download_dir: None,
            download_outcome: None,
            download_requested: false,
            stop_reason: None,
        }
    }

    pub fn with_driver(program: ResolvedProgram, driver: BrowserDriver) -> Self {
        let mut interpreter = Self::new(program);
        interpreter.driver = Some(driver);
        interpreter
    }

    pub fn continue_on_error_all(mut self, enabled: bool) -> Self {
        self.continue_on_error_all = enabled;
        self
    }

    pub fn default_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn default_download_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.default_download_dir = dir;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.context
    }

    /// Reclaim the browser (for `keep_browser_open` handling).
    pub fn take_driver(&mut self) -> Option<BrowserDriver> {
        self.driver.take()
    }

    fn driver(&self) -> Result<&BrowserDriver, AutomationError> {
        self.driver
            .as_ref()
            .ok_or_else(|| AutomationError::Internal("no browser attached to this run".into()))
    }

    fn effective_timeout(&self, action: &Action) -> Duration {
        match action.timeout_ms.or(self.default_timeout_ms) {
            Some(ms) => Duration::from_millis(ms),
            None => action.effective_timeout(),
        }
    }

    /// Run to completion and fold everything into the outcome.
    pub async fn run(&mut self) -> RunOutcome {
        let mut failed = false;

        while self.context.instruction_pointer < self.program.len() {
            if self.context.is_cancelled() {
                warn!("run cancelled at action boundary");
                self.context.record_error(
                    "Cancelled",
                    "cancelled before completion".into(),
                    self.context.instruction_pointer,
                );
                failed = true;
                break;
            }

            let ip = self.context.instruction_pointer;
            let action = self.program.actions[ip].clone();
            let resolved = self.context.substitute_action(&action);
            self.context.should_increment = true;
            let started = Instant::now();

            debug!(ip, kind = resolved.kind.name(), "executing action");

            match self.execute(ip, &resolved).await {
                Ok(()) => {
                    self.metrics.record_action(true);
                }
                Err(AutomationError::StopRequested(reason)) => {
                    self.metrics.record_action(false);
                    error!(ip, reason = %reason, "automation stopped by program");
                    self.stop_reason = Some(reason.clone());
                    self.context
                        .record_error("StopRequested", reason, ip);
                    self.context.instruction_pointer = self.program.len();
                    failed = true;
                    break;
                }
                Err(e) => {
                    self.metrics.record_action(false);
                    let elapsed = started.elapsed();

                    if let Some(catch_ip) = self.unwind_to_catch() {
                        debug!(ip, catch_ip, "error caught by TRY frame: {e}");
                        self.context.record_error(e.kind(), e.to_string(), ip);
                        self.context.instruction_pointer = catch_ip + 1;
                        continue;
                    }

                    if resolved.continue_on_error || self.continue_on_error_all {
                        warn!(ip, "action failed, continuing: {e}");
                        self.context.record_error(e.kind(), e.to_string(), ip);
                        self.context.instruction_pointer = ip + 1;
                        continue;
                    }

                    let summary = FailureSummary::new(ip, &e, elapsed);
                    error!("{summary}");
                    self.context.record_error(e.kind(), e.to_string(), ip);
                    failed = true;
                    break;
                }
            }

            if self.context.should_increment {
                self.context.instruction_pointer += 1;
            }
        }

        if !failed && !self.context.block_stack.is_empty() {
            // The resolver guarantees balance, so a leftover frame is an
            // interpreter bug, not a user error.
            error!(
                frames = self.context.block_stack.len(),
                "block stack not empty at end of run"
            );
            failed = true;
        }

        self.metrics.set_variable_count(self.context.variables.len());
        self.build_outcome(failed)
    }

    fn build_outcome(&self, failed: bool) -> RunOutcome {
        let downloads_completed = self
            .download_outcome
            .as_ref()
            .map_or(0, |outcome| outcome.downloads_completed);
        let download_verdict = self.download_outcome.as_ref().map(|outcome| outcome.verdict);

        // Contract to the scheduler: consuming every action is not enough
        // when downloads were requested; zero completed downloads is a
        // failed run even if the gallery ended cleanly.
        let downloads_ok = !self.download_requested
            || (matches!(
                download_verdict,
                Some(ManagerVerdict::DoneOk)
                    | Some(ManagerVerdict::DoneLimit)
                    | Some(ManagerVerdict::DoneEndOfGallery)
            ) && downloads_completed > 0);

        RunOutcome {
            success: !failed && downloads_ok,
            stop_reason: self.stop_reason.clone(),
            download_requested: self.download_requested,
            downloads_completed,
            download_verdict,
            errors: self.context.errors.clone(),
            variables: self.context.variables.clone(),
        }
    }

    /// Pop frames until an armed TRY is found; mark it taken and return its
    /// CATCH_BEGIN ip.
    fn unwind_to_catch(&mut self) -> Option<usize> {
        while let Some(frame) = self.context.block_stack.last() {
            if frame.kind == BlockKind::Try && frame.taken_branch.is_none() {
                let catch_ip = frame.catch_ip?;
                if let Some(frame) = self.context.block_stack.last_mut() {
                    frame.taken_branch = Some(catch_ip);
                }
                return Some(catch_ip);
            }
            self.context.block_stack.pop();
        }
        None
    }

    async fn execute(&mut self, ip: usize, action: &Action) -> Result<(), AutomationError> {
        match action.kind {
            ActionKind::NavigateTo => {
                let url = action
                    .value
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .or_else(|| action.value_str("url").map(str::to_string))
                    .ok_or_else(|| {
                        AutomationError::Malformed("NAVIGATE_TO needs a url value".into())
                    })?;
                let timeout = self.effective_timeout(action);
                self.driver()?.navigate(&url, timeout).await
            }

            ActionKind::RefreshPage => {
                let timeout = self.effective_timeout(action);
                self.driver()?.reload(timeout).await
            }

            ActionKind::SwitchPanel | ActionKind::ClickButton => {
                let selector = selector_of(action)?;
                let timeout = self.effective_timeout(action);
                self.driver()?.click(&selector, false, timeout).await
            }

            ActionKind::ExpandDialog => {
                let selector = selector_of(action)?;
                let timeout = self.effective_timeout(action);
                self.driver()?.click(&selector, true, timeout).await
            }

            ActionKind::InputText => {
                let selector = selector_of(action)?;
                let text = action
                    .value
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let timeout = self.effective_timeout(action);
                self.driver()?.fill(&selector, &text, timeout).await
            }

            ActionKind::ToggleSetting => {
                let selector = selector_of(action)?;
                let desired = action
                    .value
                    .as_ref()
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| {
                        AutomationError::Malformed("TOGGLE_SETTING needs a bool value".into())
                    })?;
                self.toggle_setting(&selector, desired, self.effective_timeout(action))
                    .await
            }

            ActionKind::UploadImage => {
                let selector = selector_of(action)?;
                let path = action
                    .value
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        AutomationError::Malformed("UPLOAD_IMAGE needs a file path value".into())
                    })?;
                let timeout = self.effective_timeout(action);
                self.driver()?
                    .upload(&selector, Path::new(path), timeout)
                    .await
            }

            ActionKind::DownloadFile => self.download_file(action).await,

            ActionKind::Wait => {
                let ms = action
                    .value
                    .as_ref()
                    .and_then(json_as_ms)
                    .ok_or_else(|| {
                        AutomationError::Malformed("WAIT needs a millisecond value".into())
                    })?;
                sleep(Duration::from_millis(ms)).await;
                Ok(())
            }

            ActionKind::WaitForElement => {
                let selector = selector_of(action)?;
                let timeout = self.effective_timeout(action);
                self.driver()?
                    .wait_for_selector(&selector, timeout, WaitState::Visible)
                    .await?;
                Ok(())
            }

            ActionKind::CheckElement => self.check_element(action).await,

            ActionKind::SetVariable => {
                let name = action
                    .value_str("name")
                    .ok_or_else(|| AutomationError::Malformed("SET_VARIABLE needs a name".into()))?
                    .to_string();
                let value = action
                    .value
                    .as_ref()
                    .and_then(|v| v.get("value"))
                    .map(VarValue::from_json)
                    .unwrap_or(VarValue::Text(String::new()));
                self.context.set_variable(name, value);
                Ok(())
            }

            ActionKind::IncrementVariable => {
                let name = action
                    .value_str("name")
                    .ok_or_else(|| {
                        AutomationError::Malformed("INCREMENT_VARIABLE needs a name".into())
                    })?
                    .to_string();
                let increment = action.value_f64("increment").unwrap_or(1.0);
                let current = self
                    .context
                    .variables
                    .get(&name)
                    .and_then(VarValue::as_number)
                    .unwrap_or(0.0);
                self.context
                    .set_variable(name, VarValue::Number(current + increment));
                Ok(())
            }

            ActionKind::LogMessage => self.log_message(action).await,

            ActionKind::IfBegin => {
                let condition = condition_of(action)?;
                let end_ip = self.program.jumps[ip]
                    .if_end
                    .ok_or_else(|| AutomationError::Internal("unresolved IF_BEGIN".into()))?;

                if condition.evaluate(&self.context) {
                    self.context.block_stack.push(BlockFrame {
                        kind: BlockKind::If,
                        begin_ip: ip,
                        end_ip,
                        taken_branch: Some(ip),
                        catch_ip: None,
                        iteration_count: 0,
                    });
                } else {
                    self.context.block_stack.push(BlockFrame {
                        kind: BlockKind::If,
                        begin_ip: ip,
                        end_ip,
                        taken_branch: None,
                        catch_ip: None,
                        iteration_count: 0,
                    });
                    self.jump(self.program.jumps[ip].next_alternative.unwrap_or(end_ip));
                }
                Ok(())
            }

            ActionKind::Elif => {
                let frame_taken = self.top_if_frame(ip)?.taken_branch;
                if frame_taken.is_some() {
                    let end_ip = self.top_if_frame(ip)?.end_ip;
                    self.jump(end_ip);
                    return Ok(());
                }
                let condition = condition_of(action)?;
                if condition.evaluate(&self.context) {
                    self.top_if_frame(ip)?.taken_branch = Some(ip);
                } else {
                    let end_ip = self.top_if_frame(ip)?.end_ip;
                    self.jump(self.program.jumps[ip].next_alternative.unwrap_or(end_ip));
                }
                Ok(())
            }

            ActionKind::Else => {
                let frame_taken = self.top_if_frame(ip)?.taken_branch;
                if frame_taken.is_some() {
                    let end_ip = self.top_if_frame(ip)?.end_ip;
                    self.jump(end_ip);
                } else {
                    self.top_if_frame(ip)?.taken_branch = Some(ip);
                }
                Ok(())
            }

            ActionKind::IfEnd => {
                match self.context.block_stack.pop() {
                    Some(frame) if frame.kind == BlockKind::If => Ok(()),
                    _ => Err(AutomationError::Internal(format!(
                        "IF_END at #{ip} without an open IF frame"
                    ))),
                }
            }

            ActionKind::WhileBegin => {
                let condition = condition_of(action)?;
                let end_ip = self.program.jumps[ip]
                    .while_end
                    .ok_or_else(|| AutomationError::Internal("unresolved WHILE_BEGIN".into()))?;

                let on_top = matches!(
                    self.context.block_stack.last(),
                    Some(frame) if frame.kind == BlockKind::While && frame.begin_ip == ip
                );

                if condition.evaluate(&self.context) {
                    if on_top {
                        if let Some(frame) = self.context.block_stack.last_mut() {
                            frame.iteration_count += 1;
                        }
                    } else {
                        self.context.block_stack.push(BlockFrame {
                            kind: BlockKind::While,
                            begin_ip: ip,
                            end_ip,
                            taken_branch: None,
                            catch_ip: None,
                            iteration_count: 1,
                        });
                    }
                } else {
                    if on_top {
                        self.context.block_stack.pop();
                    }
                    self.jump(end_ip + 1);
                }
                Ok(())
            }

            ActionKind::WhileEnd => {
                let begin = self.program.jumps[ip]
                    .while_begin
                    .ok_or_else(|| AutomationError::Internal("unresolved WHILE_END".into()))?;
                self.jump(begin);
                Ok(())
            }

            ActionKind::Break => {
                // Unwind up to and including the innermost WHILE, then land
                // one past its terminator (bounds-checked).
                let mut target = None;
                while let Some(frame) = self.context.block_stack.pop() {
                    if frame.kind == BlockKind::While {
                        target = Some(frame.end_ip + 1);
                        break;
                    }
                }
                let target = target.ok_or_else(|| {
                    AutomationError::Internal(format!("BREAK at #{ip} without an open WHILE"))
                })?;
                self.jump(target);
                Ok(())
            }

            ActionKind::Continue => {
                while let Some(frame) = self.context.block_stack.last() {
                    if frame.kind == BlockKind::While {
                        let begin = frame.begin_ip;
                        self.jump(begin);
                        return Ok(());
                    }
                    self.context.block_stack.pop();
                }
                Err(AutomationError::Internal(format!(
                    "CONTINUE at #{ip} without an open WHILE"
                )))
            }

            ActionKind::ConditionalWait => self.conditional_wait(action).await,

            ActionKind::SkipIf => {
                let condition = condition_of(action)?;
                if condition.evaluate(&self.context) {
                    debug!(ip, "condition passed, skipping next action");
                    self.jump(ip + 2);
                }
                Ok(())
            }

            ActionKind::TryBegin => {
                let catch_ip = self.program.jumps[ip].catch_ip.ok_or_else(|| {
                    AutomationError::Internal("unresolved TRY_BEGIN".into())
                })?;
                let end_ip = self.program.jumps[ip].catch_end.unwrap_or(catch_ip);
                self.context.block_stack.push(BlockFrame {
                    kind: BlockKind::Try,
                    begin_ip: ip,
                    end_ip,
                    taken_branch: None,
                    catch_ip: Some(catch_ip),
                    iteration_count: 0,
                });
                Ok(())
            }

            ActionKind::CatchBegin => {
                // Reached in normal flow only when the TRY body finished
                // clean; the catch body is skipped entirely.
                let end = self.program.jumps[ip]
                    .catch_end
                    .ok_or_else(|| AutomationError::Internal("unresolved CATCH_BEGIN".into()))?;
                self.jump(end);
                Ok(())
            }

            ActionKind::CatchEnd => match self.context.block_stack.pop() {
                Some(frame) if frame.kind == BlockKind::Try => Ok(()),
                _ => Err(AutomationError::Internal(format!(
                    "CATCH_END at #{ip} without an open TRY frame"
                ))),
            },

            ActionKind::StopAutomation => {
                let reason = action
                    .value_str("reason")
                    .unwrap_or("stopped by program")
                    .to_string();
                if let Some(log_file) = action.value_str("log_file") {
                    let line = format!(
                        "[{}] STOP_AUTOMATION: {reason}\n",
                        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
                    );
                    append_to_file(Path::new(log_file), &line).await?;
                }
                Err(AutomationError::StopRequested(reason))
            }

            ActionKind::StartGenerationDownloads => self.start_generation_downloads(action).await,
        }
    }

    fn jump(&mut self, target: usize) {
        self.context.instruction_pointer = target.min(self.program.len());
        self.context.should_increment = false;
    }

    fn top_if_frame(&mut self, ip: usize) -> Result<&mut BlockFrame, AutomationError> {
        match self.context.block_stack.last_mut() {
            Some(frame) if frame.kind == BlockKind::If => Ok(frame),
            _ => Err(AutomationError::Internal(format!(
                "branch marker at #{ip} without an open IF frame"
            ))),
        }
    }

    async fn toggle_setting(
        &self,
        selector: &str,
        desired: bool,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let driver = self.driver()?;
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); return el ? !!el.checked : null; }})()",
            sel = serde_json::to_string(selector)?
        );
        let current = driver.evaluate(&script).await?;
        match current.as_bool() {
            Some(state) if state == desired => Ok(()),
            Some(_) => driver.click(selector, true, timeout).await,
            None => Err(AutomationError::ElementNotFound(selector.to_string())),
        }
    }

    async fn check_element(&mut self, action: &Action) -> Result<(), AutomationError> {
        let selector = selector_of(action)?;
        let check = action.value_str("check").unwrap_or("equals").to_string();
        let expected = action
            .value
            .as_ref()
            .and_then(|v| v.get("value"))
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let attribute = action.value_str("attribute").unwrap_or("text").to_string();

        self.metrics.record_check();

        let handle = self.driver()?.query(&selector).await?;
        let actual = match handle {
            None => {
                // Absence is a failed check, never an error.
                self.context.last_check = crate::context::LastCheck {
                    success: false,
                    value: None,
                    attribute_read: Some(attribute),
                };
                return Ok(());
            }
            Some(handle) => match attribute.as_str() {
                "text" => handle.text().await,
                "value" => handle.value_property().await?,
                name => handle.attribute(name).await.unwrap_or_default(),
            },
        };

        let success = compare_check(&check, &actual, &expected)?;
        debug!(selector = %selector, check = %check, actual = %actual, success, "check element");

        self.context.last_check = crate::context::LastCheck {
            success,
            value: Some(actual),
            attribute_read: Some(attribute),
        };
        Ok(())
    }

    async fn conditional_wait(&mut self, action: &Action) -> Result<(), AutomationError> {
        let value = action
            .value
            .as_ref()
            .ok_or_else(|| AutomationError::Malformed("CONDITIONAL_WAIT needs a value".into()))?;
        let condition = Condition::parse(
            value
                .get("condition")
                .ok_or_else(|| AutomationError::Malformed("CONDITIONAL_WAIT needs a condition".into()))?,
        )?;
        let max_retries = value.get("max_retries").and_then(|v| v.as_u64()).unwrap_or(3);
        let base_delay = value
            .get("delay_ms")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(1));
        let exponential = value
            .get("backoff")
            .and_then(|v| v.as_str())
            .map(|s| s.eq_ignore_ascii_case("exponential"))
            .unwrap_or(false);

        let started = Instant::now();
        let mut delay = base_delay;

        for attempt in 0..=max_retries {
            if condition.evaluate(&self.context) {
                return Ok(());
            }
            if attempt == max_retries {
                break;
            }
            debug!(attempt, ?delay, "condition not met, waiting");
            self.metrics.record_condition_retry();
            sleep(delay).await;
            if exponential {
                delay = (delay * 2).min(MAX_CONDITIONAL_WAIT_DELAY);
            }
        }

        Err(AutomationError::timeout("<condition>", started.elapsed()))
    }

    async fn log_message(&self, action: &Action) -> Result<(), AutomationError> {
        let text = action.value_str("text").unwrap_or_default().to_string();
        let level = action.value_str("level").unwrap_or("info");

        match level.to_ascii_lowercase().as_str() {
            "debug" => debug!("{text}"),
            "warning" | "warn" => warn!("{text}"),
            "error" => error!("{text}"),
            _ => info!("{text}"),
        }

        if let Some(log_file) = action.value_str("log_file") {
            let line = format!(
                "[{}] {text}\n",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
            );
            append_to_file(Path::new(log_file), &line).await?;
        }
        Ok(())
    }

    async fn download_file(&mut self, action: &Action) -> Result<(), AutomationError> {
        let selector = selector_of(action)?;
        let download_dir = action
            .value_str("download_dir")
            .map(PathBuf::from)
            .or_else(|| self.default_download_dir.clone())
            .ok_or_else(|| {
                AutomationError::Malformed("DOWNLOAD_FILE needs a download_dir".into())
            })?;
        let filename = action
            .value_str("filename")
            .ok_or_else(|| AutomationError::Malformed("DOWNLOAD_FILE needs a filename".into()))?
            .to_string();
        let timeout = self.effective_timeout(action);

        let driver = self.driver()?;
        let trigger_selector = selector.clone();
        let captured = driver
            .download_next(
                move || async move { driver.click(&trigger_selector, true, timeout).await },
                &download_dir,
                timeout.max(Duration::from_secs(30)),
            )
            .await?;

        let target = download_dir.join(&filename);
        tokio::fs::rename(&captured, &target).await?;
        info!(file = %target.display(), "file downloaded");
        Ok(())
    }

    async fn start_generation_downloads(
        &mut self,
        action: &Action,
    ) -> Result<(), AutomationError> {
        let mut value = action
            .value
            .clone()
            .ok_or_else(|| {
                AutomationError::Malformed("START_GENERATION_DOWNLOADS needs a configuration".into())
            })?;

        // The environment's download directory fills in only when the
        // program doesn't pin one itself.
        if let (Some(default_dir), Some(map)) =
            (&self.default_download_dir, value.as_object_mut())
        {
            map.entry("downloads_folder".to_string())
                .or_insert_with(|| serde_json::json!(default_dir.to_string_lossy()));
        }

        let config = DownloadManagerConfig::from_action_value(&value)?;
        self.download_requested = true;

        let cancelled = self.context.cancellation_handle();
        let driver = self.driver()?;
        let manager =
            GenerationDownloadManager::new(driver, config, cancelled, self.metrics.clone()).await?;
        let outcome = manager.run().await?;

        let failed = outcome.verdict == ManagerVerdict::DoneError;
        let reason = outcome.reason.clone();
        self.download_outcome = Some(outcome);

        if failed {
            return Err(AutomationError::DownloadFailed(reason));
        }
        Ok(())
    }
}

fn selector_of(action: &Action) -> Result<String, AutomationError> {
    action
        .selector
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AutomationError::Malformed(format!("{} needs a selector", action.kind.name()))
        })
}

fn condition_of(action: &Action) -> Result<Condition, AutomationError> {
    let value = action.value.as_ref().ok_or_else(|| {
        AutomationError::InvalidCondition(format!("{} needs a condition", action.kind.name()))
    })?;
    // Conditions arrive either bare or wrapped in {"condition": ...}.
    match value.get("condition") {
        Some(inner) => Condition::parse(inner),
        None => Condition::parse(value),
    }
}

fn json_as_ms(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Numeric coercion for greater/less/not_zero; string semantics otherwise.
fn compare_check(check: &str, actual: &str, expected: &str) -> Result<bool, AutomationError> {
    match check {
        "equals" => Ok(match (actual.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => actual == expected,
        }),
        "not_equals" => Ok(match (actual.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(a), Ok(b)) => a != b,
            _ => actual != expected,
        }),
        "contains" => Ok(actual.contains(expected)),
        "greater" => Ok(numeric(actual)? > numeric(expected)?),
        "less" => Ok(numeric(actual)? < numeric(expected)?),
        "not_zero" => Ok(numeric(actual).map(|n| n != 0.0).unwrap_or(false)),
        other => Err(AutomationError::InvalidCondition(format!(
            "unknown check operator '{other}'"
        ))),
    }
}

fn numeric(text: &str) -> Result<f64, AutomationError> {
    text.trim().parse::<f64>().map_err(|_| {
        AutomationError::InvalidCondition(format!("'{text}' is not numeric"))
    })
}

async fn append_to_file(path: &Path, line: &str) -> Result<(), AutomationError> {
    use tokio::io::AsyncWriteExt;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
