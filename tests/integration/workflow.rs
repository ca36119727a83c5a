//! Complete workflow integration tests.
//!
//! Tests that verify the full pipeline from a workflow document to a walked
//! graph.

use casework::testing::{RecordingHandler, Script, ScriptedPlugin};
use casework::{
    Arguments, Event, EventBus, GraphError, PluginRegistry, StoreAccess, TaskId, TaskStatus,
    Walker, WorkflowError, YamlLoader,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{Workspace, record};

#[tokio::test]
async fn test_yaml_workflow_runs_in_dependency_order() {
    let ws = Workspace::new();
    let workflow = YamlLoader::parse_workflow(
        r#"
tasks:
  collect:
    type: bash
    command: echo collect >> order
  parse:
    type: bash
    command: echo parse >> order
    requires: [collect]
  report:
    type: bash
    command: echo report >> order
    requires: [parse]
"#,
    )
    .unwrap();

    let report = workflow
        .run(
            &ws.store(),
            &ws.plugins(),
            PluginRegistry::with_builtins(),
            &Arguments::new(),
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.succeeded_count(), 3);
    assert_eq!(ws.read_store_file("order"), "collect\nparse\nreport\n");
}

#[tokio::test]
async fn test_failure_skips_dependents_but_not_siblings() {
    let ws = Workspace::new();
    let workflow = YamlLoader::parse_workflow(
        r#"
a:
  type: bash
  command: touch a.done
b:
  type: bash
  command: echo broken >&2; exit 3
c:
  type: bash
  command: touch c.done
  requires: [b]
"#,
    )
    .unwrap();

    let err = workflow
        .run(
            &ws.store(),
            &ws.plugins(),
            PluginRegistry::new(),
            &Arguments::new(),
        )
        .await
        .unwrap_err();

    let report = err.report().expect("run should have happened");
    assert_eq!(report.status(&TaskId::new("a")), Some(TaskStatus::Succeeded));
    assert_eq!(report.failed_tasks, vec![TaskId::new("b")]);
    assert_eq!(report.skipped_tasks, vec![TaskId::new("c")]);

    let b = report.get_task_result(&TaskId::new("b")).unwrap();
    assert_eq!(b.error.as_deref().map(str::trim), Some("broken"));

    assert!(ws.store().join("a.done").exists());
    assert!(!ws.store().join("c.done").exists());

    let text = err.to_string();
    assert!(text.contains("b: broken"));
    assert!(text.contains("c: skipped, requirement b did not succeed"));
}

#[tokio::test]
async fn test_cycle_prevents_any_execution() {
    let ws = Workspace::new();
    let workflow = YamlLoader::parse_workflow(
        r#"
root:
  type: bash
  command: touch root.done
a:
  type: bash
  command: touch a.done
  requires: [b]
b:
  type: bash
  command: touch b.done
  requires: [a]
"#,
    )
    .unwrap();

    let err = workflow
        .run(
            &ws.store(),
            &ws.plugins(),
            PluginRegistry::new(),
            &Arguments::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Invalid(GraphError::CycleDetected(_))
    ));
    assert!(!ws.store().join("root.done").exists());
}

#[tokio::test]
async fn test_unknown_requirement_is_configuration_error() {
    let ws = Workspace::new();
    let workflow = YamlLoader::parse_workflow(
        "a:\n  type: bash\n  command: \"true\"\n  requires: [ghost]\n",
    )
    .unwrap();

    let err = workflow
        .run(
            &ws.store(),
            &ws.plugins(),
            PluginRegistry::new(),
            &Arguments::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Invalid(GraphError::UnknownDependency { .. })
    ));
    assert!(err.report().is_none());
}

#[tokio::test]
async fn test_panicking_plugin_fails_only_its_vertex() {
    let ws = Workspace::new();
    let mut plugins = PluginRegistry::new();
    plugins.register(
        "explode",
        Arc::new(ScriptedPlugin::new(Script::Panic("boom".into()))),
    );

    let workflow = YamlLoader::parse_workflow(
        r#"
explode:
  type: plugin
  command: explode
after:
  type: bash
  command: touch after.done
  requires: [explode]
sibling:
  type: bash
  command: touch sibling.done
"#,
    )
    .unwrap();

    let err = Walker::new(plugins)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    let report = err.report().unwrap();
    let explode = report.get_task_result(&TaskId::new("explode")).unwrap();
    assert_eq!(explode.status, TaskStatus::Failed);
    assert!(explode.error.as_deref().unwrap().contains("boom"));
    assert_eq!(report.status(&TaskId::new("after")), Some(TaskStatus::Skipped));
    assert_eq!(report.status(&TaskId::new("sibling")), Some(TaskStatus::Succeeded));
    assert!(ws.store().join("sibling.done").exists());
}

#[tokio::test]
async fn test_argument_precedence() {
    let ws = Workspace::new();
    ws.script("flags", "printf '%s\\n' \"$@\" > flags");

    let workflow = YamlLoader::parse_workflow(
        r#"
arguments:
  case: one
  mode: quick
tasks:
  dump:
    type: plugin
    command: flags
    with:
      depth: 3
      verbose: true
      quiet: false
    filter:
      - type: file
        ext: exe
"#,
    )
    .unwrap();

    let global = Arguments::new().with("mode", "deep").with("depth", 2);
    Walker::new(PluginRegistry::new())
        .run(&workflow, &ws.store(), &ws.plugins(), &global)
        .await
        .unwrap();

    assert_eq!(
        ws.read_store_file("flags"),
        "--case=one\n--depth=3\n--mode=deep\n--verbose\n--filter=ext=exe,type=file\n"
    );
}

#[tokio::test]
async fn test_records_flow_between_plugins() {
    let ws = Workspace::new();
    let mut plugins = PluginRegistry::with_builtins();
    plugins.register(
        "seed",
        Arc::new(ScriptedPlugin::new(Script::Insert(vec![
            record(&[("type", "file"), ("name", "a.exe")]),
            record(&[("type", "file"), ("name", "b.txt")]),
            record(&[("type", "process"), ("name", "a.exe")]),
        ]))),
    );

    let export = ws.root().join("out").join("executables.json");
    let workflow = YamlLoader::parse_workflow(&format!(
        r#"
seed:
  type: plugin
  command: seed
export:
  type: plugin
  command: export-json
  requires: [seed]
  with:
    file: {}
  filter:
    - type: file
      name: .exe
"#,
        export.display()
    ))
    .unwrap();

    Walker::new(plugins)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap();

    let exported: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0]["name"], "a.exe");
    assert!(exported[0]["id"].as_str().unwrap().starts_with("file--"));
}

#[tokio::test]
async fn test_serialize_tasks_runs_one_vertex_at_a_time() {
    let ws = Workspace::new();
    let mut plugins = PluginRegistry::new();
    for name in ["one", "two", "three"] {
        plugins.register(
            name,
            Arc::new(ScriptedPlugin::new(Script::Succeed).with_delay(Duration::from_millis(150))),
        );
    }

    let workflow = YamlLoader::parse_workflow(
        r#"
one: {type: plugin, command: one}
two: {type: plugin, command: two}
three: {type: plugin, command: three}
"#,
    )
    .unwrap();

    let start = Instant::now();
    Walker::new(plugins)
        .with_store_access(StoreAccess::SerializeTasks)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(450));
}

#[tokio::test]
async fn test_serialized_writes_overlap_tasks_and_keep_lines_intact() {
    let ws = Workspace::new();
    let mut plugins = PluginRegistry::new();
    let mut seeders = Vec::new();
    for name in ["one", "two", "three", "four"] {
        let records = (0..25)
            .map(|i| {
                let n = i.to_string();
                record(&[("type", "event"), ("source", name), ("n", n.as_str())])
            })
            .collect();
        let plugin = Arc::new(
            ScriptedPlugin::new(Script::Insert(records)).with_delay(Duration::from_millis(200)),
        );
        plugins.register(name, plugin.clone());
        seeders.push(plugin);
    }

    let workflow = YamlLoader::parse_workflow(
        r#"
one: {type: plugin, command: one}
two: {type: plugin, command: two}
three: {type: plugin, command: three}
four: {type: plugin, command: four}
"#,
    )
    .unwrap();

    let start = Instant::now();
    Walker::new(plugins)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(700));

    let mut spans = Vec::new();
    for seeder in &seeders {
        spans.extend(seeder.spans().await);
    }
    let latest_start = spans.iter().map(|(s, _)| *s).max().unwrap();
    let earliest_finish = spans.iter().map(|(_, f)| *f).min().unwrap();
    assert!(latest_start < earliest_finish);

    let content = ws.read_store_file("records.jsonl");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 100);
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value["id"].as_str().unwrap().starts_with("event--"));
    }
}

#[tokio::test]
async fn test_block_scalar_shell_command_with_arguments() {
    let ws = Workspace::new();
    let workflow = YamlLoader::parse_workflow(
        r#"
hello:
  type: bash
  command: |
    echo hello > greeting
    printf '%s\n' > flags
  with:
    mode: deep
"#,
    )
    .unwrap();

    Walker::new(PluginRegistry::new())
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap();

    assert_eq!(ws.read_store_file("greeting"), "hello\n");
    assert_eq!(ws.read_store_file("flags"), "--mode=deep\n");
}

#[tokio::test]
async fn test_events_for_failed_run() {
    let ws = Workspace::new();
    let handler = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;

    let workflow = YamlLoader::parse_workflow(
        r#"
a: {type: bash, command: "false"}
b: {type: bash, command: "true", requires: [a]}
c: {type: bash, command: "true"}
"#,
    )
    .unwrap();

    let _ = Walker::new(PluginRegistry::new())
        .with_event_bus(bus)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await;

    assert_eq!(
        handler
            .count(|e| matches!(e, Event::WorkflowStarted { task_count: 3, .. }))
            .await,
        1
    );
    assert_eq!(handler.count(|e| matches!(e, Event::TaskStarted { .. })).await, 2);
    assert_eq!(handler.count(|e| matches!(e, Event::TaskFailed { .. })).await, 1);
    assert_eq!(handler.count(|e| matches!(e, Event::TaskSkipped { .. })).await, 1);
    assert_eq!(
        handler
            .count(|e| matches!(e, Event::WorkflowCompleted { success: false, .. }))
            .await,
        1
    );

    let events = handler.events().await;
    assert!(matches!(events.last(), Some(Event::WorkflowCompleted { .. })));
}
