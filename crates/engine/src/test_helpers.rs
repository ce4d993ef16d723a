// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{DeviceTransform, EncryptionWorkQueue, OnlineEncryptionPipeline, Scheduler};
use ode_adapters::{FakeCommandRunner, FakeDiskUtil};
use ode_core::test_support::scratch_env;
use ode_core::{DeviceItem, EncryptionEnvironment, FakeClock};
use ode_mount::MountConfigStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) const HEADER: u64 = 4096;
pub(crate) const BLOCK: u64 = 1024;
pub(crate) const DEVICE_SIZE: u64 = 16384;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub env: EncryptionEnvironment,
    pub disk: FakeDiskUtil,
    pub runner: FakeCommandRunner,
    pub clock: Arc<FakeClock>,
    pub store: Arc<MountConfigStore>,
    pub queue: Arc<EncryptionWorkQueue>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut env = scratch_env(dir.path()).unwrap();
        env.luks_header_bytes = HEADER;
        let env = env.copy_block_bytes(BLOCK);
        let disk = FakeDiskUtil::new().with_mapper_dir(&env.mapper_dir);
        let store = Arc::new(MountConfigStore::new(env.clone(), Arc::new(disk.clone())));
        Self {
            dir,
            env,
            disk,
            runner: FakeCommandRunner::new(),
            clock: Arc::new(FakeClock::new()),
            store,
            queue: Arc::new(EncryptionWorkQueue::new()),
        }
    }

    /// A mounted ext4 "device" backed by a patterned file, listed in fstab.
    pub fn device(&self, name: &str) -> DeviceItem {
        let path = self.dir.path().join("dev").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, pattern(DEVICE_SIZE as usize, name.len() as u8)).unwrap();
        let mount_point = self.dir.path().join("mnt").join(name);
        std::fs::create_dir_all(&mount_point).unwrap();

        let fstab_line = format!("{} {} ext4 defaults 0 0\n", path.display(), mount_point.display());
        let mut fstab = std::fs::read_to_string(&self.env.fstab).unwrap_or_default();
        fstab.push_str(&fstab_line);
        std::fs::write(&self.env.fstab, fstab).unwrap();

        DeviceItem::builder()
            .name(name)
            .path(path.display().to_string())
            .size_bytes(DEVICE_SIZE)
            .mount_point(mount_point)
            .build()
    }

    pub fn key_file(&self) -> PathBuf {
        let key = self.env.default_key_file();
        std::fs::write(&key, "passphrase").unwrap();
        key
    }

    pub fn pipeline(&self) -> OnlineEncryptionPipeline {
        OnlineEncryptionPipeline::new(
            self.store.clone(),
            Arc::new(self.runner.clone()),
            self.queue.clone(),
            self.clock.clone(),
        )
    }

    pub fn transform(&self) -> Arc<DeviceTransform> {
        Arc::new(DeviceTransform::new(self.store.clone(), Arc::new(self.runner.clone()), self.clock.clone()))
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.store.clone(), self.queue.clone(), self.transform())
    }

    pub fn mapper_file(&self, mapper: &str) -> PathBuf {
        self.env.mapper_dir.join(mapper)
    }
}

pub(crate) fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
}

pub(crate) fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_default()
}
