//! Shared fixtures for the workspace specs.
//!
//! A [`Host`] is a scratch root with every table path, key file and device
//! node redirected under a temp dir, plus fake disk and command layers.

#![allow(dead_code)]

pub use ode_adapters::{FakeCommandRunner, FakeDiskUtil};
pub use ode_core::{CryptRecord, DeviceItem, EncryptionEnvironment, FakeClock};
pub use ode_engine::{DeviceTransform, EncryptionWorkQueue, OnlineEncryptionPipeline, Scheduler};
pub use ode_mount::{MigrationReport, MountConfigStore};
pub use ode_storage::ProgressLedger;
pub use similar_asserts::assert_eq;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

use ode_core::test_support::scratch_env;
use tempfile::TempDir;

pub const HEADER: u64 = 8192;
pub const BLOCK: u64 = 2048;
pub const DEVICE_SIZE: u64 = 64 * 1024;

pub struct Host {
    pub dir: TempDir,
    pub env: EncryptionEnvironment,
    pub disk: FakeDiskUtil,
    pub runner: FakeCommandRunner,
    pub clock: Arc<FakeClock>,
}

impl Host {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut env = scratch_env(dir.path()).unwrap();
        env.luks_header_bytes = HEADER;
        let env = env.copy_block_bytes(BLOCK);
        let disk = FakeDiskUtil::new().with_mapper_dir(&env.mapper_dir);
        Self { dir, env, disk, runner: FakeCommandRunner::new(), clock: Arc::new(FakeClock::new()) }
    }

    /// A fresh store over the host's tables, as a new agent process would build.
    pub fn store(&self) -> Arc<MountConfigStore> {
        Arc::new(MountConfigStore::new(self.env.clone(), Arc::new(self.disk.clone())))
    }

    pub fn pipeline(&self, store: &Arc<MountConfigStore>, queue: &Arc<EncryptionWorkQueue>) -> OnlineEncryptionPipeline {
        OnlineEncryptionPipeline::new(store.clone(), Arc::new(self.runner.clone()), queue.clone(), self.clock.clone())
    }

    pub fn scheduler(&self, store: &Arc<MountConfigStore>, queue: &Arc<EncryptionWorkQueue>) -> Scheduler {
        let transform = DeviceTransform::new(store.clone(), Arc::new(self.runner.clone()), self.clock.clone());
        Scheduler::new(store.clone(), queue.clone(), Arc::new(transform))
    }

    /// Run the agent's boot pass against this host's fakes.
    pub fn boot(&self) -> ode_agent::BootSummary {
        ode_agent::boot(
            &self.env,
            Arc::new(self.disk.clone()),
            Arc::new(self.runner.clone()),
            self.clock.clone(),
        )
        .unwrap()
    }

    /// A mounted ext4 data disk backed by a patterned file and listed in fstab.
    pub fn data_disk(&self, name: &str) -> DeviceItem {
        let path = self.dir.path().join("dev").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, pattern(DEVICE_SIZE as usize, name.len() as u8)).unwrap();
        let mount_point = self.mount_point(name);
        self.append(&self.env.fstab, &format!("{} {} ext4 defaults 0 0\n", path.display(), mount_point.display()));

        DeviceItem::builder()
            .name(name)
            .path(path.display().to_string())
            .size_bytes(DEVICE_SIZE)
            .mount_point(mount_point)
            .build()
    }

    pub fn mount_point(&self, name: &str) -> PathBuf {
        let mp = self.dir.path().join("mnt").join(name);
        std::fs::create_dir_all(&mp).unwrap();
        mp
    }

    pub fn key_file(&self) -> PathBuf {
        let key = self.env.default_key_file();
        std::fs::write(&key, "passphrase").unwrap();
        key
    }

    pub fn mapper_path(&self, mapper: &str) -> PathBuf {
        self.env.mapper_dir.join(mapper)
    }

    pub fn write(&self, path: &Path, content: &str) {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn append(&self, path: &Path, content: &str) {
        let mut existing = read(path);
        existing.push_str(content);
        self.write(path, &existing);
    }
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}
