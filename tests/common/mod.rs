//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use casework::Record;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch store and plugin directories for one run.
pub struct Workspace {
    root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("store")).unwrap();
        std::fs::create_dir_all(root.path().join("plugins")).unwrap();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn store(&self) -> PathBuf {
        self.root.path().join("store")
    }

    pub fn plugins(&self) -> PathBuf {
        self.root.path().join("plugins")
    }

    /// Write an executable script into the plugin directory.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.plugins().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Read a file from the store directory, or an empty string if it is
    /// missing.
    pub fn read_store_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.store().join(name)).unwrap_or_default()
    }
}

/// Build a record from `(key, value)` string pairs.
pub fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}
