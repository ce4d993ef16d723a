// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line grammars for the legacy registry, crypttab and fstab.
//!
//! Parsers return `None` for blank, commented or short lines and never fail
//! harder than that. Formatters produce exactly what the parsers accept.

use ode_adapters::DistroInfo;
use ode_core::env::{BEK_KEY_FILE_NAME, FSTAB_COMMENT};
use ode_core::{CryptRecord, EncryptionEnvironment, UNKNOWN_LUKS_SLOT};
use std::path::{Path, PathBuf};

/// Device column of the BEK volume's fstab line.
pub const BEK_FSTAB_DEVICE: &str = "LABEL=BEK\\040VOLUME";

const NONE: &str = "None";

// ── fstab ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabLine {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: Vec<String>,
}

/// `device mountpoint fstype options [dump pass]`
pub fn parse_fstab_line(line: &str) -> Option<FstabLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }
    Some(FstabLine {
        device: fields[0].to_string(),
        mount_point: fields[1].to_string(),
        fs_type: fields[2].to_string(),
        options: fields[3].split(',').map(|o| o.trim().to_string()).collect(),
    })
}

pub fn format_fstab_line(device: &str, mount_point: &Path, fs_type: &str, options: &str) -> String {
    format!("{device} {} {fs_type} {options} 0 0", mount_point.display())
}

/// fstab line mounting a data-disk mapper.
pub fn data_disk_fstab_line(mapper_device: &Path, mount_point: &Path, fs_type: &str) -> String {
    format_fstab_line(&mapper_device.display().to_string(), mount_point, fs_type, "defaults,nofail,discard")
}

/// The managed fstab entry: marker comment plus the line itself.
pub fn commented_fstab_entry(line: &str) -> String {
    format!("{FSTAB_COMMENT}\n{line}\n")
}

/// fstab line for the BEK volume; Ubuntu 14.x needs `nobootwait`.
pub fn bek_fstab_line(bek_mount_point: &Path, distro: &DistroInfo) -> String {
    let options = if distro.is_ubuntu_14() {
        "defaults,discard,nobootwait"
    } else {
        "defaults,discard,nofail"
    };
    format_fstab_line(BEK_FSTAB_DEVICE, bek_mount_point, "auto", options)
}

pub fn is_bek_line(line: &str) -> bool {
    parse_fstab_line(line).is_some_and(|l| l.device == BEK_FSTAB_DEVICE)
}

/// Insert `nofail` at the front of the options column when missing.
///
/// Blank, commented and short lines come back unchanged.
pub fn add_nofail_if_absent(line: &str) -> String {
    let Some(parsed) = parse_fstab_line(line) else {
        return line.to_string();
    };
    if parsed.options.iter().any(|o| o == "nofail") {
        return line.to_string();
    }
    let mut fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    fields[3] = format!("nofail,{}", fields[3]);
    fields.join(" ")
}

// ── crypttab ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrypttabLine {
    pub name: String,
    pub device: String,
    pub key_file: String,
    pub options: Vec<String>,
}

impl CrypttabLine {
    /// Value of a `header=` option; an empty value counts as absent.
    pub fn header(&self) -> Option<&str> {
        self.options.iter().find_map(|o| o.strip_prefix("header=")).filter(|h| !h.is_empty())
    }
}

/// `name device keyfile options` without any ownership check.
pub fn parse_crypttab_fields(line: &str) -> Option<CrypttabLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }
    Some(CrypttabLine {
        name: fields[0].to_string(),
        device: fields[1].to_string(),
        key_file: fields[2].to_string(),
        options: fields[3].split(',').map(|o| o.trim().to_string()).collect(),
    })
}

/// True when the key file follows one of the agent's naming conventions.
pub fn is_managed_key_file(key_file: &str, env: &EncryptionEnvironment) -> bool {
    let from_bek = Path::new(key_file)
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(BEK_KEY_FILE_NAME));
    from_bek || key_file.starts_with(&*env.cleartext_key_prefix.to_string_lossy())
}

/// Parse a crypttab line owned by the agent into a record.
///
/// Mount point and file system are not part of crypttab; the caller fills
/// them in from fstab or live state.
pub fn parse_crypttab_line(line: &str, env: &EncryptionEnvironment) -> Option<CryptRecord> {
    let parsed = parse_crypttab_fields(line)?;
    if !is_managed_key_file(&parsed.key_file, env) {
        return None;
    }
    let cleartext = parsed.key_file.starts_with(&*env.cleartext_key_prefix.to_string_lossy());
    let mut record = CryptRecord::new(parsed.name.clone(), parsed.device.clone());
    record.uses_cleartext_key = cleartext;
    record.luks_header_path = parsed.header().map(PathBuf::from);
    record.key_file_path = Some(PathBuf::from(&parsed.key_file));
    Some(record)
}

/// `mapper device keyfile luks,nofail[,header=<path>]`
pub fn format_crypttab_line(record: &CryptRecord, key_file: &Path) -> String {
    let mut options = String::from("luks,nofail");
    if let Some(header) = &record.luks_header_path {
        options.push_str(&format!(",header={}", header.display()));
    }
    format!("{} {} {} {options}", record.mapper_name, record.device_path, key_file.display())
}

// ── legacy registry ─────────────────────────────────────────────────────

/// `mapper device header|None mount|None fs|None True|False [slot]`
pub fn parse_legacy_line(line: &str) -> Option<CryptRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }
    let opt = |s: &str| (s != NONE).then(|| s.to_string());
    let slot = fields.get(6).and_then(|s| s.parse::<i32>().ok()).unwrap_or(UNKNOWN_LUKS_SLOT);
    Some(CryptRecord {
        mapper_name: fields[0].to_string(),
        device_path: fields[1].to_string(),
        luks_header_path: opt(fields[2]).map(PathBuf::from),
        mount_point: opt(fields[3]).map(PathBuf::from),
        file_system: opt(fields[4]),
        uses_cleartext_key: fields[5].eq_ignore_ascii_case("true"),
        current_luks_slot: slot.max(UNKNOWN_LUKS_SLOT),
        key_file_path: None,
    })
}

pub fn format_legacy_line(record: &CryptRecord) -> String {
    let path_or_none = |p: &Option<PathBuf>| {
        p.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| NONE.to_string())
    };
    format!(
        "{} {} {} {} {} {} {}",
        record.mapper_name,
        record.device_path,
        path_or_none(&record.luks_header_path),
        path_or_none(&record.mount_point),
        record.file_system.as_deref().unwrap_or(NONE),
        if record.uses_cleartext_key { "True" } else { "False" },
        record.current_luks_slot,
    )
}

#[cfg(test)]
#[path = "lines_tests.rs"]
mod tests;
