//! Container integration tests.
//!
//! Container and build tasks are walked against a [`FakeRuntime`] that
//! records every call.

use casework::execution::{PLUGINS_MOUNT, STORE_MOUNT, TRANSIT_MOUNT, build_tag};
use casework::runtime::{Mount, RegistryAuth};
use casework::testing::{FakeRuntime, RuntimeCall};
use casework::{
    Arguments, ContainerExitPolicy, PluginRegistry, TaskId, TaskStatus, Walker, YamlLoader,
};
use std::io::Read;
use std::sync::Arc;

use crate::common::Workspace;

fn walker(runtime: &Arc<FakeRuntime>) -> Walker {
    Walker::new(PluginRegistry::new()).with_runtime(runtime.clone())
}

fn credentials() -> Arguments {
    Arguments::new()
        .with("docker-user", "alice")
        .with("docker-password", "hunter2")
        .with("docker-server", "registry.example.com")
}

#[tokio::test]
async fn test_container_task_mounts_and_flags() {
    let ws = Workspace::new();
    let runtime = Arc::new(FakeRuntime::new().with_logs("3 hashes\n"));
    let input = ws.root().join("incoming").join("disk.img");

    let workflow = YamlLoader::parse_workflow(&format!(
        r#"
hash:
  type: docker
  image: casework/hash:1
  command: hash --all
  with:
    file: {}
    algorithm: sha256
  filter:
    - type: file
"#,
        input.display()
    ))
    .unwrap();

    let report = walker(&runtime)
        .run(&workflow, &ws.store(), &ws.plugins(), &credentials())
        .await
        .unwrap();

    let result = report.get_task_result(&TaskId::new("hash")).unwrap();
    assert_eq!(result.output.as_ref().unwrap().stdout, "3 hashes\n");

    assert_eq!(
        runtime.operations().await,
        vec!["login", "pull", "create", "start", "wait", "logs", "remove"]
    );

    let calls = runtime.calls().await;
    assert_eq!(
        calls[0],
        RuntimeCall::Login(RegistryAuth {
            username: "alice".into(),
            password: "hunter2".into(),
            server: "registry.example.com".into(),
        })
    );
    assert_eq!(calls[1], RuntimeCall::Pull("casework/hash:1".into()));

    let spec = runtime.created().await.remove(0);
    assert_eq!(spec.image, "casework/hash:1");
    assert_eq!(spec.working_dir.as_deref(), Some(STORE_MOUNT));
    assert_eq!(
        spec.mounts,
        vec![
            Mount::bind(ws.store().display().to_string(), STORE_MOUNT),
            Mount::bind(ws.plugins().display().to_string(), PLUGINS_MOUNT),
            Mount::bind(
                ws.root().join("incoming").display().to_string(),
                TRANSIT_MOUNT
            ),
        ]
    );
    assert_eq!(
        spec.command,
        vec![
            "hash",
            "--all",
            "--algorithm=sha256",
            "--file=disk.img",
            "--filter=type=file",
        ]
    );
    // the transit directory is created so it can be mounted
    assert!(ws.root().join("incoming").is_dir());
}

#[tokio::test]
async fn test_no_login_without_user() {
    let ws = Workspace::new();
    let runtime = Arc::new(FakeRuntime::new());
    let workflow = YamlLoader::parse_workflow(
        "ls:\n  type: docker\n  image: alpine\n  command: ls\n",
    )
    .unwrap();

    walker(&runtime)
        .run(
            &workflow,
            &ws.store(),
            &ws.plugins(),
            &Arguments::new().with("docker-server", "registry.example.com"),
        )
        .await
        .unwrap();

    let operations = runtime.operations().await;
    assert!(!operations.contains(&"login"));
    assert_eq!(operations[0], "pull");
    assert_eq!(runtime.created().await[0].command, vec!["ls"]);
}

#[tokio::test]
async fn test_nonzero_exit_fails_when_enforced() {
    let ws = Workspace::new();
    let runtime = Arc::new(FakeRuntime::new().with_exit_code(2).with_logs("no such file"));
    let workflow = YamlLoader::parse_workflow(
        "scan:\n  type: docker\n  image: scanner\n",
    )
    .unwrap();

    let err = walker(&runtime)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    let result = err
        .report()
        .unwrap()
        .get_task_result(&TaskId::new("scan"))
        .unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("container exited with code 2: no such file")
    );
    // the container is removed even though the task failed
    assert_eq!(runtime.operations().await.last(), Some(&"remove"));
}

#[tokio::test]
async fn test_nonzero_exit_reported_when_ignored() {
    let ws = Workspace::new();
    let runtime = Arc::new(FakeRuntime::new().with_exit_code(2).with_logs("no such file"));
    let workflow = YamlLoader::parse_workflow(
        "scan:\n  type: docker\n  image: scanner\n",
    )
    .unwrap();

    let report = walker(&runtime)
        .with_container_exit(ContainerExitPolicy::Ignore)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap();

    let output = report
        .get_task_result(&TaskId::new("scan"))
        .unwrap()
        .output
        .clone()
        .unwrap();
    assert_eq!(output.exit_code, Some(2));
    assert_eq!(output.stdout, "no such file");
}

#[tokio::test]
async fn test_pull_failure_fails_vertex_only() {
    let ws = Workspace::new();
    let runtime = Arc::new(FakeRuntime::new().failing("pull"));
    let workflow = YamlLoader::parse_workflow(
        r#"
remote:
  type: docker
  image: private/tool
local:
  type: bash
  command: touch local.done
"#,
    )
    .unwrap();

    let err = walker(&runtime)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(report.failed_tasks, vec![TaskId::new("remote")]);
    assert!(
        report
            .get_task_result(&TaskId::new("remote"))
            .unwrap()
            .error
            .as_deref()
            .unwrap()
            .contains("pull failed")
    );
    assert_eq!(runtime.operations().await, vec!["pull"]);
    assert!(ws.store().join("local.done").exists());
}

#[tokio::test]
async fn test_build_task_packs_context_and_runs_built_image() {
    let ws = Workspace::new();
    let context = ws.plugins().join("Strings");
    std::fs::create_dir_all(context.join("src")).unwrap();
    std::fs::write(context.join("Dockerfile"), "FROM alpine\n").unwrap();
    std::fs::write(context.join("src").join("run.sh"), "strings \"$@\"\n").unwrap();

    let runtime = Arc::new(FakeRuntime::new().with_logs("done"));
    let workflow = YamlLoader::parse_workflow(
        r#"
strings:
  type: dockerfile
  dockerfile: Strings
  command: /run.sh
  with:
    min-length: 6
"#,
    )
    .unwrap();

    walker(&runtime)
        .run(&workflow, &ws.store(), &ws.plugins(), &credentials())
        .await
        .unwrap();

    let tag = build_tag("Strings");
    assert!(tag.starts_with("casework-plugin-strings-"));
    assert_eq!(
        runtime.operations().await,
        vec!["login", "build", "create", "start", "wait", "logs", "remove"]
    );

    let calls = runtime.calls().await;
    let RuntimeCall::Build {
        tag: built,
        context: archive,
    } = &calls[1]
    else {
        panic!("expected build call, got {:?}", calls[1]);
    };
    assert_eq!(built, &tag);

    let mut entries = Vec::new();
    let mut archive = tar::Archive::new(archive.as_slice());
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().to_string();
        if path.ends_with("run.sh") {
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            assert_eq!(body, "strings \"$@\"\n");
        }
        entries.push(path);
    }
    assert!(entries.iter().any(|p| p.ends_with("Dockerfile")));
    assert!(entries.iter().any(|p| p.ends_with("src/run.sh")));

    let spec = runtime.created().await.remove(0);
    assert_eq!(spec.image, tag);
    assert_eq!(spec.command, vec!["/run.sh", "--min-length=6"]);
}

#[tokio::test]
async fn test_build_failure_is_reported() {
    let ws = Workspace::new();
    std::fs::create_dir_all(ws.plugins().join("broken")).unwrap();
    let runtime = Arc::new(FakeRuntime::new().failing("build"));
    let workflow = YamlLoader::parse_workflow(
        "broken:\n  type: dockerfile\n  dockerfile: broken\n",
    )
    .unwrap();

    let err = walker(&runtime)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    let error = err
        .report()
        .unwrap()
        .get_task_result(&TaskId::new("broken"))
        .unwrap()
        .error
        .clone()
        .unwrap();
    assert!(error.starts_with("image build failed"));
    assert!(!runtime.operations().await.contains(&"create"));
}

#[tokio::test]
async fn test_missing_build_context() {
    let ws = Workspace::new();
    let runtime = Arc::new(FakeRuntime::new());
    let workflow = YamlLoader::parse_workflow(
        "ghost:\n  type: dockerfile\n  dockerfile: ghost\n",
    )
    .unwrap();

    let err = walker(&runtime)
        .run(&workflow, &ws.store(), &ws.plugins(), &Arguments::new())
        .await
        .unwrap_err();

    assert_eq!(err.report().unwrap().failed_tasks, vec![TaskId::new("ghost")]);
    assert!(runtime.calls().await.is_empty());
}
