//! Host path → bind mount source translation.

use std::path::Path;

use crate::core::task::TaskError;

/// Rewrite a drive-letter path (`X:\foo\bar`) to `/x/foo/bar`.
///
/// Any other path is returned unchanged.
pub fn translate_path(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest = path[2..].replace('\\', "/");
        format!("/{}{}", drive, rest)
    } else {
        path.to_string()
    }
}

/// Make `dir` usable as a bind mount source.
///
/// Creates the directory if it is missing, resolves it to an absolute path,
/// and translates it with [`translate_path`].
pub async fn prepare_mount_source(dir: &Path) -> Result<String, TaskError> {
    tokio::fs::create_dir_all(dir).await?;
    let absolute = std::path::absolute(dir)?;
    Ok(translate_path(&absolute.to_string_lossy()))
}
