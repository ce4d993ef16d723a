// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slice arithmetic and positioned copies for the bulk data move.
//!
//! The mapper sits `header` bytes into the device, so mapper offset `x` is
//! device offset `x + header`. Copying from the end keeps every write ahead
//! of the data still to be read, and a slice no larger than the header never
//! overwrites its own source.

use std::fs::{File, OpenOptions};
use std::ops::Range;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Number of slices needed to move `total` bytes in `block`-sized pieces.
pub fn slice_count(total: u64, block: u64) -> u64 {
    if block == 0 {
        return 0;
    }
    total.div_ceil(block)
}

/// Byte range of slice `index`, counting from the end when `from_end`.
///
/// The last slice in sweep order is the short one. `None` past the end.
pub fn slice_range(index: u64, block: u64, total: u64, from_end: bool) -> Option<Range<u64>> {
    if index >= slice_count(total, block) {
        return None;
    }
    let done = index * block;
    let len = block.min(total - done);
    if from_end {
        let end = total - done;
        Some(end - len..end)
    } else {
        Some(done..done + len)
    }
}

/// Copy `range` of `source` to the same offsets in `destination`, then sync.
pub fn copy_range(source: &Path, destination: &Path, range: Range<u64>) -> std::io::Result<()> {
    let src = File::open(source)?;
    let dst = OpenOptions::new().write(true).open(destination)?;
    let mut buf = vec![0u8; (range.end - range.start) as usize];
    src.read_exact_at(&mut buf, range.start)?;
    dst.write_all_at(&buf, range.start)?;
    dst.sync_data()
}

/// Copy the first `len` bytes of `source` into a fresh file at `destination`.
pub fn copy_head(source: &Path, destination: &Path, len: u64) -> std::io::Result<()> {
    let src = File::open(source)?;
    let mut buf = vec![0u8; len as usize];
    src.read_exact_at(&mut buf, 0)?;
    let dst = OpenOptions::new().create(true).write(true).truncate(true).open(destination)?;
    dst.write_all_at(&buf, 0)?;
    dst.sync_all()
}

#[cfg(test)]
#[path = "copy_tests.rs"]
mod tests;
