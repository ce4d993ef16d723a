// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::MountConfigStore;
use ode_adapters::FakeDiskUtil;
use ode_core::test_support::scratch_env;
use ode_core::EncryptionEnvironment;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub env: EncryptionEnvironment,
    pub disk: FakeDiskUtil,
    pub store: MountConfigStore,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let env = scratch_env(dir.path()).unwrap();
        let disk = FakeDiskUtil::new().with_mapper_dir(&env.mapper_dir);
        let store = MountConfigStore::new(env.clone(), Arc::new(disk.clone()));
        Self { dir, env, disk, store }
    }

    /// A directory under the temp root standing in for a mount point.
    pub fn mount_point(&self, name: &str) -> std::path::PathBuf {
        let mp = self.dir.path().join(name);
        std::fs::create_dir_all(&mp).unwrap();
        mp
    }

    pub fn mapper(&self, name: &str) -> String {
        self.env.mapper_dir.join(name).display().to_string()
    }
}

pub(crate) fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

pub(crate) fn write(path: &Path, content: &str) {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).unwrap();
    }
    std::fs::write(path, content).unwrap();
}
