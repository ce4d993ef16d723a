// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`DiskUtil`] backed by standard Linux tools.
//!
//! Block-device facts come from `lsblk`, LUKS state from `cryptsetup`, and
//! the mount table from `/proc/mounts`. Shrinking covers the ext family.

use crate::disk::{DiskError, DiskUtil, DistroInfo, EncryptionStatus, MountItem};
use crate::exec::{CommandRunner, ExecOutput, Invocation};
use ode_core::EncryptionEnvironment;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Token slot holding the key protector written at enable time.
const PROTECTOR_TOKEN_ID: &str = "5";

pub struct SystemDiskUtil {
    runner: Arc<dyn CommandRunner>,
    mapper_dir: PathBuf,
    proc_mounts: PathBuf,
    azure_udev_root: PathBuf,
    os_release: PathBuf,
}

impl SystemDiskUtil {
    pub fn new(runner: Arc<dyn CommandRunner>, env: &EncryptionEnvironment) -> Self {
        Self {
            runner,
            mapper_dir: env.mapper_dir.clone(),
            proc_mounts: PathBuf::from("/proc/mounts"),
            azure_udev_root: PathBuf::from("/dev/disk/azure"),
            os_release: PathBuf::from("/etc/os-release"),
        }
    }

    /// Read host facts from alternative locations (tests, chroots).
    pub fn with_host_files(
        mut self,
        proc_mounts: impl Into<PathBuf>,
        azure_udev_root: impl Into<PathBuf>,
        os_release: impl Into<PathBuf>,
    ) -> Self {
        self.proc_mounts = proc_mounts.into();
        self.azure_udev_root = azure_udev_root.into();
        self.os_release = os_release.into();
        self
    }

    fn run(&self, invocation: Invocation) -> ExecOutput {
        self.runner.run(&invocation)
    }

    fn run_checked(&self, invocation: Invocation) -> Result<ExecOutput, DiskError> {
        let out = self.runner.run(&invocation);
        if out.success() {
            Ok(out)
        } else {
            Err(DiskError::command_failed(invocation.display(), out.exit_code, &out.stderr))
        }
    }

    fn cryptsetup(&self) -> Invocation {
        Invocation::new("cryptsetup")
    }

    /// Scan `/dev/disk/azure/scsi<c>/lun<l>` links for one resolving to `target`.
    fn find_azure_link(&self, target: &Path) -> Result<Option<(u32, u32, PathBuf)>, DiskError> {
        let Ok(controllers) = std::fs::read_dir(&self.azure_udev_root) else {
            return Ok(None);
        };
        for controller in controllers.flatten() {
            let name = controller.file_name().to_string_lossy().into_owned();
            let Some(c) = name.strip_prefix("scsi").and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            for lun in std::fs::read_dir(controller.path())?.flatten() {
                let lun_name = lun.file_name().to_string_lossy().into_owned();
                let Some(l) = lun_name.strip_prefix("lun").and_then(|n| n.parse::<u32>().ok())
                else {
                    continue;
                };
                if std::fs::canonicalize(lun.path()).ok().as_deref() == Some(target) {
                    return Ok(Some((c, l, lun.path())));
                }
            }
        }
        Ok(None)
    }
}

impl DiskUtil for SystemDiskUtil {
    fn encryption_status(&self) -> Result<EncryptionStatus, DiskError> {
        let os_mapper = format!("/dev/mapper/{}", self.os_mapper_name());
        let mounts = self.mount_items()?;
        let os_encrypted = mounts.iter().any(|m| m.dest == Path::new("/") && m.src == os_mapper);
        let data_encrypted = mounts
            .iter()
            .any(|m| m.src.starts_with("/dev/mapper/") && m.src != os_mapper && m.dest != Path::new("/"));
        let label = |b: bool| (if b { "Encrypted" } else { "NotEncrypted" }).to_string();
        Ok(EncryptionStatus { os: label(os_encrypted), data: label(data_encrypted) })
    }

    fn mount_items(&self) -> Result<Vec<MountItem>, DiskError> {
        let content = std::fs::read_to_string(&self.proc_mounts)?;
        Ok(parse_proc_mounts(&content))
    }

    fn controller_and_lun(&self, device_path: &str) -> Result<Option<(u32, u32)>, DiskError> {
        let Ok(target) = std::fs::canonicalize(device_path) else {
            return Ok(None);
        };
        Ok(self.find_azure_link(&target)?.map(|(c, l, _)| (c, l)))
    }

    fn device_file_system(&self, device_path: &str) -> Result<Option<String>, DiskError> {
        if !Path::new(device_path).exists() {
            return Err(DiskError::DeviceNotFound(device_path.to_string()));
        }
        let out = self.run_checked(Invocation::new("lsblk").args(["-dno", "FSTYPE", device_path]))?;
        let fs = out.stdout.trim();
        Ok((!fs.is_empty()).then(|| fs.to_string()))
    }

    fn is_device_locked(&self, device_path: &str) -> Result<bool, DiskError> {
        if !self.is_luks_device(device_path, None) {
            return Ok(false);
        }
        let out = self.run_checked(Invocation::new("lsblk").args(["-rno", "TYPE", device_path]))?;
        Ok(!out.stdout.lines().skip(1).any(|t| t.trim() == "crypt"))
    }

    fn is_luks_device(&self, device_path: &str, header: Option<&Path>) -> bool {
        let target = header.map(|h| h.display().to_string()).unwrap_or_else(|| device_path.to_string());
        self.run(self.cryptsetup().args(["isLuks", target.as_str()])).success()
    }

    fn luks_devices(&self) -> Result<Vec<String>, DiskError> {
        let out = self.run_checked(Invocation::new("lsblk").args(["-rpno", "NAME,FSTYPE"]))?;
        Ok(parse_luks_devices(&out.stdout))
    }

    fn luks_open(
        &self,
        device_path: &str,
        mapper_name: &str,
        key_file: &Path,
        header: Option<&Path>,
    ) -> Result<(), DiskError> {
        if self.mapper_dir.join(mapper_name).exists() {
            return Ok(());
        }
        let mut inv = self.cryptsetup().arg("open").arg("--key-file").arg(key_file.display().to_string());
        if let Some(h) = header {
            inv = inv.arg("--header").arg(h.display().to_string());
        }
        self.run_checked(inv.args([device_path, mapper_name])).map(drop)
    }

    fn luks_close(&self, mapper_name: &str) -> Result<(), DiskError> {
        self.run_checked(self.cryptsetup().args(["close", mapper_name])).map(drop)
    }

    fn mount_filesystem(
        &self,
        device: &Path,
        mount_point: &Path,
        file_system: Option<&str>,
    ) -> Result<(), DiskError> {
        std::fs::create_dir_all(mount_point)?;
        let mut inv = Invocation::new("mount");
        if let Some(fs) = file_system.filter(|fs| *fs != "auto") {
            inv = inv.args(["-t", fs]);
        }
        let inv = inv.arg(device.display().to_string()).arg(mount_point.display().to_string());
        self.run_checked(inv).map(drop)
    }

    fn umount(&self, mount_point: &Path) -> Result<(), DiskError> {
        self.run_checked(Invocation::new("umount").arg(mount_point.display().to_string())).map(drop)
    }

    fn check_shrink_fs(&self, device_path: &str, target_bytes: u64) -> Result<(), DiskError> {
        // e2fsck exits 1 when it corrected errors
        let check = self.run(Invocation::new("e2fsck").args(["-f", "-y", device_path]));
        if check.exit_code != 0 && check.exit_code != 1 {
            return Err(DiskError::command_failed("e2fsck", check.exit_code, &check.stderr));
        }
        let size = format!("{}K", target_bytes / 1024);
        self.run_checked(Invocation::new("resize2fs").args([device_path, size.as_str()])).map(drop)
    }

    fn export_token(&self, device_path: &str) -> Result<Option<String>, DiskError> {
        let out = self.run(
            self.cryptsetup().args(["token", "export", "--token-id", PROTECTOR_TOKEN_ID, device_path]),
        );
        Ok(out.success().then_some(out.stdout).filter(|s| !s.trim().is_empty()))
    }

    fn luks_check_reencryption(&self, device_path: &str, header: Option<&Path>) -> bool {
        // A detached header that has not yet been written back means the
        // bulk copy is unfinished.
        if let Some(h) = header.filter(|h| h.exists()) {
            return self.is_luks_device(device_path, Some(h)) && !self.is_luks_device(device_path, None);
        }
        let out = self.run(self.cryptsetup().args(["luksDump", device_path]));
        out.success() && out.stdout.contains("online-reencrypt")
    }

    fn mapper_backing_device(&self, mapper_name: &str) -> Result<Option<String>, DiskError> {
        let out = self.run(self.cryptsetup().args(["status", mapper_name]));
        if !out.success() {
            return Ok(None);
        }
        Ok(parse_status_device(&out.stdout))
    }

    fn persistent_path(&self, device_path: &str) -> Result<String, DiskError> {
        let target = std::fs::canonicalize(device_path)?;
        Ok(self
            .find_azure_link(&target)?
            .map(|(_, _, link)| link.display().to_string())
            .unwrap_or_else(|| device_path.to_string()))
    }

    fn distro(&self) -> Result<DistroInfo, DiskError> {
        let content = std::fs::read_to_string(&self.os_release)?;
        Ok(parse_os_release(&content))
    }
}

/// `src dest fs opts dump pass` lines; `\040` escapes become spaces.
pub(crate) fn parse_proc_mounts(content: &str) -> Vec<MountItem> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let src = parts.next()?;
            let dest = parts.next()?;
            let fs = parts.next()?;
            Some(MountItem::new(unescape_octal(src), unescape_octal(dest), fs))
        })
        .collect()
}

fn unescape_octal(s: &str) -> String {
    s.replace("\\040", " ").replace("\\011", "\t")
}

pub(crate) fn parse_luks_devices(lsblk: &str) -> Vec<String> {
    lsblk
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            (parts.next()? == "crypto_LUKS").then(|| name.to_string())
        })
        .collect()
}

pub(crate) fn parse_status_device(status: &str) -> Option<String> {
    status.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        (key.trim() == "device").then(|| value.trim().to_string())
    })
}

pub(crate) fn parse_os_release(content: &str) -> DistroInfo {
    let mut info = DistroInfo::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "ID" => info.id = value,
            "VERSION_ID" => info.version = value,
            _ => {}
        }
    }
    info
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
