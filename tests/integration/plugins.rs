//! Plugin integration tests.
//!
//! Built-in plugins against the on-disk store, and scripts resolved from the
//! plugin directory.

use casework::{
    Arguments, JsonLinesStore, PluginRegistry, TaskError, TaskId, TaskStatus, Walker, Workflow,
    Task, YamlLoader,
};

use crate::common::Workspace;

#[tokio::test]
async fn test_import_then_export_through_store_directory() {
    let ws = Workspace::new();
    let input = ws.root().join("events.json");
    std::fs::write(
        &input,
        r#"[
            {"name": "login", "user": "alice"},
            {"name": "logout", "user": "alice"},
            {"name": "login", "user": "bob"}
        ]"#,
    )
    .unwrap();
    let output = ws.root().join("logins.json");

    let workflow = YamlLoader::parse_workflow(&format!(
        r#"
import:
  type: plugin
  command: import-json
  with:
    file: {input}
    type: event
  filter:
    - name: login
export:
  type: plugin
  command: export-json
  requires: [import]
  with:
    file: {output}
"#,
        input = input.display(),
        output = output.display(),
    ))
    .unwrap();

    Walker::new(PluginRegistry::with_builtins())
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap();

    let store = JsonLinesStore::new(ws.store());
    assert!(store.path().exists());

    let exported: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let users: Vec<&str> = exported
        .iter()
        .map(|r| r["user"].as_str().unwrap())
        .collect();
    assert_eq!(users, vec!["alice", "bob"]);
    assert!(exported.iter().all(|r| r["type"] == "event"));
    assert!(
        exported
            .iter()
            .all(|r| r["id"].as_str().unwrap().starts_with("event--"))
    );
}

#[tokio::test]
async fn test_import_rejects_non_array_document() {
    let ws = Workspace::new();
    let input = ws.root().join("object.json");
    std::fs::write(&input, r#"{"name": "login"}"#).unwrap();

    let workflow = Workflow::new().task(
        "import",
        Task::plugin("import-json")
            .with_argument("file", input.display().to_string())
            .with_argument("type", "event"),
    );

    let err = Walker::new(PluginRegistry::with_builtins())
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    let result = err
        .report()
        .unwrap()
        .get_task_result(&TaskId::new("import"))
        .unwrap();
    assert!(
        result
            .error
            .as_deref()
            .unwrap()
            .contains("top level array containing objects")
    );
}

#[tokio::test]
async fn test_import_requires_type_argument() {
    let ws = Workspace::new();
    let workflow = Workflow::new().task(
        "import",
        Task::plugin("import-json").with_argument("file", "whatever.json"),
    );

    let err = Walker::new(PluginRegistry::with_builtins())
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    let result = err
        .report()
        .unwrap()
        .get_task_result(&TaskId::new("import"))
        .unwrap();
    assert!(result.error.as_deref().unwrap().contains("missing 'type'"));
}

#[tokio::test]
async fn test_script_receives_words_and_flags() {
    let ws = Workspace::new();
    ws.script("yara", "printf '%s\\n' \"$@\" > yara.args");

    let workflow = Workflow::new().task(
        "scan",
        Task::plugin("yara --fast")
            .with_argument("rules", vec!["a.yar", "b.yar"])
            .with_argument("docker-password", "secret"),
    );
    let global = Arguments::new().with("docker-user", "alice");

    let report = Walker::new(PluginRegistry::new())
        .run(&workflow, &ws.store(), &ws.plugins(), &global)
        .await
        .unwrap();

    assert_eq!(report.status(&TaskId::new("scan")), Some(TaskStatus::Succeeded));
    assert_eq!(
        ws.read_store_file("yara.args"),
        "--fast\n--rules=a.yar\n--rules=b.yar\n"
    );
}

#[tokio::test]
async fn test_script_with_exe_suffix() {
    let ws = Workspace::new();
    ws.script("hasher.exe", "echo hashed > hashed");

    let workflow = Workflow::new().task("hash", Task::plugin("hasher"));
    Walker::new(PluginRegistry::new())
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap();

    assert_eq!(ws.read_store_file("hashed"), "hashed\n");
}

#[tokio::test]
async fn test_builtin_wins_over_script_of_same_name() {
    let ws = Workspace::new();
    ws.script("export-json", "touch script-ran");
    let output = ws.root().join("all.json");

    let workflow = Workflow::new().task(
        "export",
        Task::plugin("export-json").with_argument("file", output.display().to_string()),
    );
    Walker::new(PluginRegistry::with_builtins())
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap();

    assert!(output.exists());
    assert!(!ws.store().join("script-ran").exists());
}

#[tokio::test]
async fn test_script_directory_is_configuration_error() {
    let ws = Workspace::new();
    std::fs::create_dir_all(ws.plugins().join("volatility")).unwrap();

    let workflow = Workflow::new().task("memory", Task::plugin("volatility"));
    let err = Walker::new(PluginRegistry::new())
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    let result = err
        .report()
        .unwrap()
        .get_task_result(&TaskId::new("memory"))
        .unwrap();
    assert!(result.error.as_deref().unwrap().ends_with("is a directory"));
    assert!(result.misconfigured);
    assert!(err.to_string().contains("memory: misconfigured: script"));

    let direct = casework::execution::resolve_script(&ws.plugins(), "volatility")
        .await
        .unwrap_err();
    assert!(direct.is_configuration());
    assert!(matches!(direct, TaskError::ScriptIsDirectory(_)));
}

#[tokio::test]
async fn test_missing_plugin_fails_vertex() {
    let ws = Workspace::new();
    let workflow = Workflow::new()
        .task("ghost", Task::plugin("ghost --quick"))
        .task("after", Task::shell("touch after").requires(["ghost"]));

    let err = Walker::new(PluginRegistry::with_builtins())
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(
        report
            .get_task_result(&TaskId::new("ghost"))
            .unwrap()
            .error
            .as_deref(),
        Some("no plugin or script `ghost --quick` found")
    );
    assert_eq!(report.status(&TaskId::new("after")), Some(TaskStatus::Skipped));
}
