use crate::action::ACTION_REGISTRY;
use crate::browser::BrowserDriver;
use crate::config::{AutomationConfig, ENV_LOG_LEVEL};
use crate::flow::ResolvedProgram;
use crate::interpreter::Interpreter;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "automaton")]
#[command(about = "Declarative browser-automation workflow engine")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the action vocabulary and each action's accepted fields
    ListActions,

    /// Emit a skeleton configuration
    Create {
        #[arg(short, long, help = "Automation name")]
        name: String,

        #[arg(short, long, help = "Target URL")]
        url: String,

        #[arg(short, long, help = "Output path (.json or .yaml)")]
        output: PathBuf,
    },

    /// Execute a configuration
    Run {
        #[arg(short, long, help = "Configuration file")]
        config: PathBuf,

        #[arg(long, help = "Run with a visible browser window")]
        show_browser: bool,

        #[arg(long, help = "Keep going when an action fails")]
        continue_on_error: bool,

        #[arg(long, help = "Default per-action timeout in milliseconds")]
        timeout: Option<u64>,
    },

    /// Load and control-flow-resolve a configuration without running it
    Validate {
        #[arg(short, long, help = "Configuration file")]
        config: PathBuf,
    },

    /// Convert a configuration between JSON and YAML, losslessly
    Convert {
        #[arg(short, long, help = "Input configuration")]
        input: PathBuf,

        #[arg(short, long, help = "Output path")]
        output: PathBuf,

        #[arg(long, help = "Target format; defaults to the output extension")]
        format: Option<ConfigFormat>,
    },
}

pub struct CliRunner;

impl CliRunner {
    /// Dispatch a command; the returned code becomes the process exit code.
    pub async fn run(command: Commands) -> anyhow::Result<i32> {
        match command {
            Commands::ListActions => {
                Self::list_actions();
                Ok(0)
            }
            Commands::Create { name, url, output } => Self::create(&name, &url, &output).await,
            Commands::Run {
                config,
                show_browser,
                continue_on_error,
                timeout,
            } => Self::run_automation(&config, show_browser, continue_on_error, timeout).await,
            Commands::Validate { config } => Self::validate(&config).await,
            Commands::Convert {
                input,
                output,
                format,
            } => Self::convert(&input, &output, format).await,
        }
    }

    fn list_actions() {
        println!("{:<28} {:<9} {:<40} {}", "ACTION", "SELECTOR", "VALUE", "SUMMARY");
        for spec in ACTION_REGISTRY {
            println!(
                "{:<28} {:<9} {:<40} {}",
                spec.name,
                if spec.requires_selector { "required" } else { "-" },
                spec.value_shape,
                spec.summary
            );
        }
        println!();
        println!(
            "Common fields on every action: timeout_ms (default 10000), description, continue_on_error"
        );
    }

    async fn create(name: &str, url: &str, output: &Path) -> anyhow::Result<i32> {
        let config = AutomationConfig::skeleton(name, url);
        config.validate()?;
        let text = config.to_string_for(output)?;
        tokio::fs::write(output, text).await?;
        println!("Skeleton configuration written to {}", output.display());
        Ok(0)
    }

    async fn validate(path: &Path) -> anyhow::Result<i32> {
        let config = AutomationConfig::load(path).await?;
        let program = ResolvedProgram::resolve(config.actions.clone())?;

        println!("Configuration is well-formed:");
        println!("  Name: {}", config.name);
        println!("  URL: {}", config.url);
        println!(
            "  Viewport: {}x{}",
            config.viewport.width, config.viewport.height
        );
        println!("  Actions: {}", program.len());
        Ok(0)
    }

    async fn convert(
        input: &Path,
        output: &Path,
        format: Option<ConfigFormat>,
    ) -> anyhow::Result<i32> {
        // No env overrides and no validation here: conversion is lossless.
        let text = tokio::fs::read_to_string(input).await?;
        let config = AutomationConfig::from_str_for(input, &text)?;

        let effective_target: &Path = match format {
            Some(ConfigFormat::Json) => Path::new("out.json"),
            Some(ConfigFormat::Yaml) => Path::new("out.yaml"),
            None => output,
        };
        let rendered = config.to_string_for(effective_target)?;
        tokio::fs::write(output, rendered).await?;
        println!("Converted {} -> {}", input.display(), output.display());
        Ok(0)
    }

    async fn run_automation(
        path: &Path,
        show_browser: bool,
        continue_on_error: bool,
        timeout: Option<u64>,
    ) -> anyhow::Result<i32> {
        let mut config = AutomationConfig::load(path).await?;
        if show_browser {
            config.headless = false;
        }

        let program = ResolvedProgram::resolve(config.actions.clone())?;
        info!(
            name = %config.name,
            actions = program.len(),
            headless = config.headless,
            "starting automation"
        );

        let driver = BrowserDriver::launch(&config).await?;
        driver
            .navigate(&config.url, Duration::from_millis(timeout.unwrap_or(30_000)))
            .await?;

        let mut interpreter = Interpreter::with_driver(program, driver)
            .continue_on_error_all(continue_on_error)
            .default_timeout_ms(timeout)
            .default_download_dir(config.download_dir.clone().map(PathBuf::from));

        let cancel = interpreter.context().cancellation_handle();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping at the next action boundary");
                cancel.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        });

        let outcome = interpreter.run().await;
        signal_task.abort();

        if let Some(driver) = interpreter.take_driver() {
            if outcome.success && config.keep_browser_open && !config.headless {
                driver.detach();
            } else {
                driver.close().await;
            }
        }

        if outcome.success {
            info!(
                downloads = outcome.downloads_completed,
                errors = outcome.errors.len(),
                "automation finished successfully"
            );
        } else {
            error!(
                stop_reason = outcome.stop_reason.as_deref().unwrap_or("-"),
                errors = outcome.errors.len(),
                "automation failed"
            );
            for recorded in &outcome.errors {
                error!(
                    action = recorded.action_index,
                    kind = recorded.kind,
                    "{}",
                    recorded.message
                );
            }
        }

        Ok(outcome.exit_code())
    }
}

/// Log level comes from `AUTOMATON_LOG_LEVEL`, `--verbose` bumps to DEBUG.
pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = match std::env::var(ENV_LOG_LEVEL).ok().as_deref() {
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") => tracing::Level::INFO,
        Some("WARNING") | Some("WARN") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        _ if verbose => tracing::Level::DEBUG,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_all_subcommands() {
        let cli = Cli::try_parse_from(["automaton", "list-actions"]).unwrap();
        assert!(matches!(cli.command, Commands::ListActions));

        let cli = Cli::try_parse_from([
            "automaton", "create", "-n", "demo", "-u", "https://x", "-o", "out.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Create { .. }));

        let cli = Cli::try_parse_from([
            "automaton",
            "run",
            "-c",
            "cfg.yaml",
            "--show-browser",
            "--continue-on-error",
            "--timeout",
            "5000",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                show_browser,
                continue_on_error,
                timeout,
                ..
            } => {
                assert!(show_browser);
                assert!(continue_on_error);
                assert_eq!(timeout, Some(5000));
            }
            _ => panic!("expected run"),
        }

        let cli = Cli::try_parse_from(["automaton", "validate", "-c", "cfg.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Validate { .. }));

        let cli = Cli::try_parse_from([
            "automaton", "convert", "-i", "a.json", "-o", "b.yaml", "--format", "yaml",
        ])
        .unwrap();
        match cli.command {
            Commands::Convert { format, .. } => assert_eq!(format, Some(ConfigFormat::Yaml)),
            _ => panic!("expected convert"),
        }
    }

    #[tokio::test]
    async fn test_create_then_validate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");

        let code = CliRunner::create("demo", "https://example.com", &path)
            .await
            .unwrap();
        assert_eq!(code, 0);

        let code = CliRunner::validate(&path).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_convert_json_to_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("demo.json");
        let yaml_path = dir.path().join("demo.yaml");

        CliRunner::create("demo", "https://example.com", &json_path)
            .await
            .unwrap();
        let code = CliRunner::convert(&json_path, &yaml_path, None).await.unwrap();
        assert_eq!(code, 0);

        let text = std::fs::read_to_string(&yaml_path).unwrap();
        let config = AutomationConfig::from_str_for(&yaml_path, &text).unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.actions.len(), 2);
    }

    #[tokio::test]
    async fn test_validate_rejects_unbalanced_program() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let text = r#"{
            "name": "bad",
            "url": "https://example.com",
            "actions": [{"kind": "IF_BEGIN", "value": "check_passed"}]
        }"#;
        std::fs::write(&path, text).unwrap();

        assert!(CliRunner::validate(&path).await.is_err());
    }
}
