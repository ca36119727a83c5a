//! Build-then-run executor.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::container::ContainerExecutor;
use super::executor::{Executor, Invocation, TaskOutput};
use crate::core::task::TaskError;
use crate::runtime::RegistryAuth;

/// Prefix of every image tag built from a build context.
pub const BUILD_TAG_PREFIX: &str = "casework-plugin-";

/// Builds an image from a directory under the plugin directory, then runs
/// the task in it.
#[derive(Clone)]
pub struct BuildExecutor {
    container: ContainerExecutor,
}

impl BuildExecutor {
    pub fn new(container: ContainerExecutor) -> Self {
        Self { container }
    }
}

/// Image tag for a build source: lower-cased, with anything outside
/// `[a-z0-9._-]` replaced by `-`, then a hash of the raw source so that
/// sources which sanitise alike get distinct tags.
pub fn build_tag(source: &str) -> String {
    let sanitised: String = source
        .trim_matches(|c| c == '/' || c == '\\')
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}{}-{:08x}", BUILD_TAG_PREFIX, sanitised, source_hash(source) as u32)
}

fn source_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

/// Pack `dir` recursively into an in-memory tar archive.
///
/// Entry paths are relative to `dir`.
pub async fn pack_context(dir: PathBuf) -> Result<Vec<u8>, TaskError> {
    let packed = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(true);
        builder.append_dir_all(".", &dir)?;
        builder.into_inner()
    })
    .await
    .map_err(|e| TaskError::Build(format!("packing build context panicked: {}", e)))?;

    packed.map_err(|e| TaskError::Build(format!("failed to pack build context: {}", e)))
}

fn context_dir(plugin_dir: &Path, source: &str) -> PathBuf {
    plugin_dir.join(source)
}

#[async_trait]
impl Executor for BuildExecutor {
    async fn execute(&self, invocation: &Invocation<'_>) -> Result<TaskOutput, TaskError> {
        let source = invocation
            .task
            .build_source
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TaskError::Build("task has no build source".to_string()))?;

        let dir = context_dir(&invocation.context.plugin_dir, source);
        if !tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(TaskError::Build(format!(
                "build context {} is not a directory",
                dir.display()
            )));
        }

        let context = pack_context(dir).await?;
        let tag = build_tag(source);
        let runtime = self.container.runtime();

        if let Some(auth) = RegistryAuth::from_arguments(&invocation.arguments()) {
            runtime.login(&auth).await?;
        }

        debug!(task = %invocation.task_id, tag = %tag, bytes = context.len(), "building image");
        let log = runtime
            .build(context, &tag)
            .await
            .map_err(|e| TaskError::Build(e.to_string()))?;
        debug!(tag = %tag, log = %log.trim(), "image built");

        self.container.run_image(invocation, &tag, false).await
    }
}
