// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized paths and tunables for the encryption agent.
//!
//! Every well-known location lives here so tests can relocate the whole set
//! under a temporary root with [`EncryptionEnvironment::under_root`].

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Size reserved at the head of the device for the LUKS2 header.
pub const LUKS_HEADER_BYTES: u64 = 16 * 1024 * 1024;

/// Default slice size for the bulk copy.
pub const DEFAULT_COPY_BLOCK_BYTES: u64 = 4 * 1024 * 1024;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Base name of the key file on the BEK volume.
pub const BEK_KEY_FILE_NAME: &str = "LinuxPassPhraseFileName";

/// Name of the per-mount directory holding backed-up table lines.
pub const BACKUP_DIR_NAME: &str = ".azure_ade_backup_mount_info";

/// Marker written above every fstab line the agent adds.
pub const FSTAB_COMMENT: &str = "#This line was added by Azure Disk Encryption";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionEnvironment {
    pub config_dir: PathBuf,
    /// Legacy flat registry (`azure_crypt_mount`)
    pub legacy_registry: PathBuf,
    /// Prefix for cleartext key files, e.g. `<config>/cleartext_key_<mapper>`
    pub cleartext_key_prefix: PathBuf,
    /// Ledger directory, one file per mapper
    pub ongoing_dir: PathBuf,
    /// Detached headers and header slices
    pub header_dir: PathBuf,
    pub bek_mount_point: PathBuf,
    pub fstab: PathBuf,
    pub fstab_backup: PathBuf,
    pub crypttab: PathBuf,
    pub default_cryptdisks: PathBuf,
    /// Where unlocked mappers appear (`/dev/mapper`)
    pub mapper_dir: PathBuf,
    /// Parent of scratch mount points used while restoring backups
    pub scratch_mount_root: PathBuf,
    pub luks_header_bytes: u64,
    pub copy_block_bytes: u64,
    pub command_timeout: Duration,
}

impl Default for EncryptionEnvironment {
    fn default() -> Self {
        let config_dir = PathBuf::from("/var/lib/azure_disk_encryption_config");
        Self {
            legacy_registry: config_dir.join("azure_crypt_mount"),
            cleartext_key_prefix: config_dir.join("cleartext_key_"),
            ongoing_dir: config_dir.join("ongoing"),
            header_dir: config_dir.join("headers"),
            config_dir,
            bek_mount_point: PathBuf::from("/mnt/azure_bek_disk"),
            fstab: PathBuf::from("/etc/fstab"),
            fstab_backup: PathBuf::from("/etc/fstab.azure.backup"),
            crypttab: PathBuf::from("/etc/crypttab"),
            default_cryptdisks: PathBuf::from("/etc/default/cryptdisks"),
            mapper_dir: PathBuf::from("/dev/mapper"),
            scratch_mount_root: PathBuf::from("/mnt"),
            luks_header_bytes: LUKS_HEADER_BYTES,
            copy_block_bytes: DEFAULT_COPY_BLOCK_BYTES,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl EncryptionEnvironment {
    /// Defaults with overrides from `ODE_*` environment variables.
    pub fn from_env() -> Self {
        let mut env = Self::default();
        if let Some(dir) = var_path("ODE_CONFIG_DIR") {
            env = env.with_config_dir(dir);
        }
        if let Some(p) = var_path("ODE_BEK_MOUNT_POINT") {
            env.bek_mount_point = p;
        }
        if let Some(p) = var_path("ODE_FSTAB") {
            env.fstab_backup = sibling_backup(&p);
            env.fstab = p;
        }
        if let Some(p) = var_path("ODE_CRYPTTAB") {
            env.crypttab = p;
        }
        if let Some(p) = var_path("ODE_MAPPER_DIR") {
            env.mapper_dir = p;
        }
        if let Some(n) = var_u64("ODE_COPY_BLOCK_BYTES") {
            env = env.copy_block_bytes(n);
        }
        if let Some(ms) = var_u64("ODE_COMMAND_TIMEOUT_MS") {
            env.command_timeout = Duration::from_millis(ms);
        }
        env
    }

    /// Relocate every path below `root`, keeping its relative layout.
    pub fn under_root(root: &Path) -> Self {
        let d = Self::default();
        let rebase = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));
        Self {
            config_dir: rebase(&d.config_dir),
            legacy_registry: rebase(&d.legacy_registry),
            cleartext_key_prefix: rebase(&d.cleartext_key_prefix),
            ongoing_dir: rebase(&d.ongoing_dir),
            header_dir: rebase(&d.header_dir),
            bek_mount_point: rebase(&d.bek_mount_point),
            fstab: rebase(&d.fstab),
            fstab_backup: rebase(&d.fstab_backup),
            crypttab: rebase(&d.crypttab),
            default_cryptdisks: rebase(&d.default_cryptdisks),
            mapper_dir: rebase(&d.mapper_dir),
            scratch_mount_root: rebase(&d.scratch_mount_root),
            ..d
        }
    }

    /// Move the config directory and everything derived from it.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.legacy_registry = dir.join("azure_crypt_mount");
        self.cleartext_key_prefix = dir.join("cleartext_key_");
        self.ongoing_dir = dir.join("ongoing");
        self.header_dir = dir.join("headers");
        self.config_dir = dir;
        self
    }

    /// Slice size for the bulk copy, clamped to `1..=luks_header_bytes`.
    ///
    /// A slice never exceeds the header offset, so re-copying the slice in
    /// flight after a crash reads only plaintext that has not been overwritten.
    pub fn copy_block_bytes(mut self, n: u64) -> Self {
        self.copy_block_bytes = n.clamp(1, self.luks_header_bytes);
        self
    }

    crate::setters! {
        into {
            bek_mount_point: PathBuf,
            fstab: PathBuf,
            crypttab: PathBuf,
            mapper_dir: PathBuf,
        }
        set {
            command_timeout: Duration,
        }
    }

    pub fn default_key_file(&self) -> PathBuf {
        self.bek_mount_point.join(BEK_KEY_FILE_NAME)
    }

    /// Cleartext key file for a mapper.
    pub fn cleartext_key_path(&self, mapper_name: &str) -> PathBuf {
        let mut s = self.cleartext_key_prefix.clone().into_os_string();
        s.push(mapper_name);
        PathBuf::from(s)
    }

    pub fn ledger_path(&self, mapper_name: &str) -> PathBuf {
        self.ongoing_dir.join(format!("{mapper_name}.json"))
    }

    pub fn detached_header_path(&self, mapper_name: &str) -> PathBuf {
        self.header_dir.join(format!("{mapper_name}.luksheader"))
    }

    pub fn header_slice_path(&self, mapper_name: &str) -> PathBuf {
        self.header_dir.join(format!("{mapper_name}.headerslice"))
    }

    pub fn scratch_mount_point(&self, mapper_name: &str) -> PathBuf {
        self.scratch_mount_root.join(mapper_name)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.config_dir.join("agent.lock")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config_dir.join("logs")
    }
}

/// `<mount>/.azure_ade_backup_mount_info`
pub fn backup_dir_for(mount_point: &Path) -> PathBuf {
    mount_point.join(BACKUP_DIR_NAME)
}

fn sibling_backup(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".azure.backup");
    PathBuf::from(s)
}

fn var_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

fn var_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
