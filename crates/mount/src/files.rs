// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small file helpers for line-oriented tables.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

/// Lines of `path`, or nothing when it does not exist.
pub(crate) fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Append `text`, starting on a fresh line. New files get `mode`.
pub(crate) fn append(path: &Path, text: &str, mode: u32) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let needs_newline = match fs::read(path) {
        Ok(bytes) => bytes.last().is_some_and(|b| *b != b'\n'),
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };
    let existed = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).mode(mode).open(path)?;
    if !existed {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    if needs_newline {
        file.write_all(b"\n")?;
    }
    file.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// Replace `path` with `lines` via temp file and rename, keeping its mode.
pub(crate) fn rewrite(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mode = fs::metadata(path).map(|m| m.permissions().mode()).unwrap_or(0o644);
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    {
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).mode(mode).open(tmp)?;
        for line in lines {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        file.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Write a single backed-up line, replacing any previous one.
pub(crate) fn write_backup(dir: &Path, name: &str, line: &str) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(name), format!("{}\n", line.trim_end()))
}

pub(crate) fn read_backup(dir: &Path, name: &str) -> std::io::Result<Option<String>> {
    match fs::read_to_string(dir.join(name)) {
        Ok(s) => Ok(s.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
