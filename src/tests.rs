#[cfg(test)]
mod integration_tests {
    use crate::{
        container_key_from_text, dedup_decision, find_boundary, AutomationConfig, ContainerKey,
        DedupDecision, DownloadLog, DownloadLogEntry, DuplicateMode, Interpreter, ResolvedProgram,
        VarValue,
    };
    use std::path::Path;

    /// A linear program written the way a user would write it, loaded from
    /// JSON, resolved, and shape-checked.
    #[test]
    fn test_linear_program_loads_and_resolves() {
        let text = r##"{
            "name": "linear",
            "url": "https://x/",
            "actions": [
                {"kind": "NAVIGATE_TO", "value": "https://x/"},
                {"kind": "WAIT_FOR_ELEMENT", "selector": "#h"},
                {"kind": "INPUT_TEXT", "selector": "#in", "value": "abc"},
                {"kind": "CLICK_BUTTON", "selector": "#go"}
            ]
        }"##;
        let config = AutomationConfig::from_str_for(Path::new("c.json"), text).unwrap();
        let program = ResolvedProgram::resolve(config.actions).unwrap();
        assert_eq!(program.len(), 4);
    }

    /// The counting-loop program end to end, parsed from JSON rather than
    /// built in Rust.
    #[tokio::test]
    async fn test_counting_loop_from_json_config() {
        let text = r#"{
            "name": "loop",
            "url": "https://x/",
            "actions": [
                {"kind": "SET_VARIABLE", "value": {"name": "n", "value": 0}},
                {"kind": "SET_VARIABLE", "value": {"name": "done", "value": "false"}},
                {"kind": "WHILE_BEGIN", "value": {"type": "equals", "name": "done", "value": "false"}},
                {"kind": "INCREMENT_VARIABLE", "value": {"name": "n", "increment": 1}},
                {"kind": "IF_BEGIN", "value": "n == 3"},
                {"kind": "SET_VARIABLE", "value": {"name": "done", "value": "true"}},
                {"kind": "IF_END"},
                {"kind": "WHILE_END"}
            ]
        }"#;
        let config = AutomationConfig::from_str_for(Path::new("c.json"), text).unwrap();
        let program = ResolvedProgram::resolve(config.actions).unwrap();

        let mut interpreter = Interpreter::new(program);
        let outcome = interpreter.run().await;

        assert!(outcome.success);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            outcome.variables.get("n").and_then(VarValue::as_number),
            Some(3.0)
        );
        assert_eq!(
            outcome.variables.get("done"),
            Some(&VarValue::Text("true".into()))
        );
    }

    /// STOP_AUTOMATION ends the run as failed and leaves its reason both in
    /// the outcome and in the named log file.
    #[tokio::test]
    async fn test_stop_automation_writes_reason_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let stop_log = dir.path().join("stop.log");

        let text = format!(
            r#"{{
                "name": "stop",
                "url": "https://x/",
                "actions": [
                    {{"kind": "STOP_AUTOMATION", "value": {{"reason": "queue full", "log_file": "{}"}}}}
                ]
            }}"#,
            stop_log.display()
        );
        let config = AutomationConfig::from_str_for(Path::new("c.json"), &text).unwrap();
        let program = ResolvedProgram::resolve(config.actions).unwrap();

        let mut interpreter = Interpreter::new(program);
        let outcome = interpreter.run().await;

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code(), 1);
        assert!(outcome.stop_reason.as_deref().unwrap().contains("queue full"));
        assert_eq!(outcome.downloads_completed, 0);

        let written = std::fs::read_to_string(&stop_log).unwrap();
        assert!(written.contains("queue full"));
    }

    /// SKIP-mode duplicate handling over a pre-populated log: the known
    /// container is passed over, the first unknown one is the boundary, and
    /// after downloading it the gallery has no boundary left.
    #[tokio::test]
    async fn test_skip_mode_boundary_walk() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = DownloadLog::load(dir.path()).await.unwrap();
        log.append(DownloadLogEntry::new(
            1,
            "03 Sep 2025 16:15:18",
            "A cinematic shot of a rainy street at night",
            "vid",
        ))
        .await
        .unwrap();

        // The duplicate in the detail view sends SKIP mode into
        // exit-scan-return.
        assert!(log.is_duplicate(
            "03 Sep 2025 16:15:18",
            "A cinematic shot of a rainy street at night"
        ));
        assert_eq!(
            dedup_decision(true, DuplicateMode::Skip, true),
            DedupDecision::ExitScanReturn
        );

        let keys = vec![
            (
                3,
                ContainerKey {
                    creation_datetime: "03 Sep 2025 16:15:18".into(),
                    prompt: "A cinematic shot of a rainy street at night".into(),
                },
            ),
            (
                4,
                ContainerKey {
                    creation_datetime: "04 Sep 2025 08:00:00".into(),
                    prompt: "A quiet mountain lake at dawn".into(),
                },
            ),
        ];
        assert_eq!(find_boundary(&log, &keys), Some(4));

        // Download the boundary item; the log grows by one and the walk now
        // finds nothing new.
        let sequence = log.next_sequence_index();
        log.append(DownloadLogEntry::new(
            sequence,
            "04 Sep 2025 08:00:00",
            "A quiet mountain lake at dawn",
            "vid",
        ))
        .await
        .unwrap();

        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.entries()[1].sequence_index, 2);
        assert_eq!(find_boundary(&log, &keys), None);
    }

    /// The incomplete-entry rule end to end: a placeholder with the same
    /// key never classifies the retry as duplicate, the retry is logged
    /// complete, and the placeholder stays in the file.
    #[tokio::test]
    async fn test_placeholder_never_blocks_its_own_recovery() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut log = DownloadLog::load(dir.path()).await.unwrap();
            log.append(DownloadLogEntry::placeholder(
                "05 Sep 2025 12:00:00",
                "A failed download prompt",
                "vid",
            ))
            .await
            .unwrap();
        }

        // Next run: same key appears again.
        let mut log = DownloadLog::load(dir.path()).await.unwrap();
        assert!(!log.is_duplicate("05 Sep 2025 12:00:00", "A failed download prompt"));
        assert_eq!(
            dedup_decision(true, DuplicateMode::Skip, false),
            DedupDecision::Download
        );

        log.append(DownloadLogEntry::new(
            log.next_sequence_index(),
            "05 Sep 2025 12:00:00",
            "A failed download prompt",
            "vid",
        ))
        .await
        .unwrap();

        let reloaded = DownloadLog::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.entries().len(), 2);
        assert!(reloaded.entries()[0].is_placeholder());
        assert!(reloaded.is_duplicate("05 Sep 2025 12:00:00", "A failed download prompt"));
    }

    /// Container tiles carry enough text for the lightweight sweep; pending
    /// and failed tiles never produce keys worth comparing.
    #[test]
    fn test_tile_text_to_duplicate_key() {
        let completed = "Creation Time\n04 Sep 2025 08:00:00\nA quiet mountain lake at dawn…";
        let key = container_key_from_text(completed).unwrap();
        assert_eq!(key.creation_datetime, "04 Sep 2025 08:00:00");
        assert_eq!(key.prompt, "A quiet mountain lake at dawn");

        assert!(crate::container_is_pending("Queuing\nA prompt"));
        assert!(crate::container_is_pending("Something went wrong"));
    }

    /// Config format conversion keeps the full action program intact.
    #[test]
    fn test_yaml_json_interchange_for_programs() {
        let yaml = r#"
name: interchange
url: https://example.com
actions:
  - kind: SET_VARIABLE
    value:
      name: attempts
      value: 0
  - kind: WHILE_BEGIN
    value: attempts < 3
  - kind: INCREMENT_VARIABLE
    value:
      name: attempts
      increment: 1
  - kind: WHILE_END
"#;
        let config = AutomationConfig::from_str_for(Path::new("c.yaml"), yaml).unwrap();
        let json = config.to_string_for(Path::new("c.json")).unwrap();
        let back = AutomationConfig::from_str_for(Path::new("c.json"), &json).unwrap();

        assert_eq!(back.actions.len(), 4);
        let program = ResolvedProgram::resolve(back.actions).unwrap();
        assert_eq!(program.jumps[1].while_end, Some(3));
    }

    /// A loop bounded only by its condition still terminates with the
    /// expected iteration count.
    #[tokio::test]
    async fn test_long_loop_terminates_by_condition() {
        let text = r#"{
            "name": "hundred",
            "url": "https://x/",
            "actions": [
                {"kind": "SET_VARIABLE", "value": {"name": "i", "value": 0}},
                {"kind": "WHILE_BEGIN", "value": "i < 100"},
                {"kind": "INCREMENT_VARIABLE", "value": {"name": "i", "increment": 1}},
                {"kind": "WHILE_END"}
            ]
        }"#;
        let config = AutomationConfig::from_str_for(Path::new("c.json"), text).unwrap();
        let program = ResolvedProgram::resolve(config.actions).unwrap();

        let mut interpreter = Interpreter::new(program);
        let outcome = interpreter.run().await;

        assert!(outcome.success);
        assert_eq!(
            outcome.variables.get("i").and_then(VarValue::as_number),
            Some(100.0)
        );
        assert!(interpreter.context().block_stack.is_empty());
    }
}
