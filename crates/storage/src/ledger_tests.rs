// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ode_core::test_support::strategies::arb_phase;
use ode_core::FakeClock;
use proptest::prelude::*;
use tempfile::TempDir;

fn ledger(dir: &TempDir) -> (ProgressLedger, FakeClock) {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_700_000_000_000);
    let ledger = ProgressLedger::new(dir.path().join("ongoing/data0.json"), Arc::new(clock.clone()));
    (ledger, clock)
}

fn started(ledger: &mut ProgressLedger) {
    ledger.entry.original_device_path = Some("/dev/sdc".into());
    ledger.entry.mapper_name = Some("data0".into());
    ledger.entry.device_size_bytes = Some(64 << 20);
    ledger.entry.copy_from_end = Some(true);
}

#[test]
fn load_without_file_leaves_everything_absent() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, _) = ledger(&dir);
    ledger.entry.mapper_name = Some("stale".into());
    ledger.load_from_store().unwrap();
    assert_eq!(ledger.entry, LedgerEntry::default());
    assert_eq!(ledger.phase(), Phase::NotStarted);
}

#[test]
fn commit_then_load_restores_entry() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, clock) = ledger(&dir);
    started(&mut ledger);
    ledger.transition(Phase::BackupHeader).unwrap();

    let mut reread = ProgressLedger::new(ledger.path(), Arc::new(clock));
    reread.load_from_store().unwrap();
    assert_eq!(reread.entry, ledger.entry);
    assert_eq!(reread.phase(), Phase::BackupHeader);
}

#[test]
fn cursor_without_phase_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, _) = ledger(&dir);
    ledger.entry.current_slice_index = Some(3);
    assert!(matches!(ledger.commit(), Err(LedgerError::CursorWithoutPhase)));
    assert!(!ledger.exists());
}

#[test]
fn backwards_transition_is_rejected_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, _) = ledger(&dir);
    started(&mut ledger);
    ledger.transition(Phase::BackupHeader).unwrap();
    ledger.transition(Phase::CopyData).unwrap();

    let err = ledger.transition(Phase::BackupHeader).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { from: Phase::CopyData, to: Phase::BackupHeader }));
    assert_eq!(ledger.phase(), Phase::CopyData);
}

#[test]
fn resume_remembers_and_returns_to_origin() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, _) = ledger(&dir);
    started(&mut ledger);
    ledger.transition(Phase::CopyData).unwrap();
    ledger.transition(Phase::Resume).unwrap();
    assert_eq!(ledger.entry.resumed_from, Some(Phase::CopyData));

    // A crash while resuming re-enters Resume with the same origin
    ledger.transition(Phase::Resume).unwrap();
    assert_eq!(ledger.entry.resumed_from, Some(Phase::CopyData));

    assert!(ledger.transition(Phase::EncryptHeader).is_err());
    ledger.transition(Phase::CopyData).unwrap();
    assert_eq!(ledger.entry.resumed_from, None);
}

#[test]
fn advance_slice_commits_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, clock) = ledger(&dir);
    started(&mut ledger);
    ledger.entry.phase = Some(Phase::CopyData);
    assert_eq!(ledger.advance_slice().unwrap(), 1);
    assert_eq!(ledger.advance_slice().unwrap(), 2);

    let mut reread = ProgressLedger::new(ledger.path(), Arc::new(clock));
    reread.load_from_store().unwrap();
    assert_eq!(reread.entry.current_slice_index, Some(2));
}

#[test]
fn clear_archives_with_timestamp_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, _) = ledger(&dir);
    started(&mut ledger);
    ledger.transition(Phase::CopyData).unwrap();

    let archive = ledger.clear().unwrap().unwrap();
    assert!(!ledger.exists());
    assert!(archive.exists());
    let name = archive.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(name, "data0.json_2023-11-14_22-13-20.000");
    assert_eq!(ledger.entry, LedgerEntry::default());

    assert_eq!(ledger.clear().unwrap(), None);
}

#[test]
fn clear_twice_in_same_instant_keeps_both_archives() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, _) = ledger(&dir);
    ledger.entry.phase = Some(Phase::Completed);
    ledger.commit().unwrap();
    let first = ledger.clear().unwrap().unwrap();
    ledger.entry.phase = Some(Phase::Completed);
    ledger.commit().unwrap();
    let second = ledger.clear().unwrap().unwrap();
    assert_ne!(first, second);
    assert!(first.exists() && second.exists());
}

#[test]
fn unknown_fields_and_missing_fields_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ledger, _) = ledger(&dir);
    fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
    fs::write(ledger.path(), r#"{"phase": "encrypt_device", "mapper_name": "data0"}"#).unwrap();
    ledger.load_from_store().unwrap();
    assert_eq!(ledger.phase(), Phase::EncryptDevice);
    assert_eq!(ledger.entry.current_slice_index, None);
}

#[test]
fn pending_mappers_ignores_archives_and_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let ongoing = dir.path().join("ongoing");
    fs::create_dir_all(&ongoing).unwrap();
    for name in ["b.json", "a.json", "a.json.tmp", "c.json_2023-11-14_22-13-20.000"] {
        fs::write(ongoing.join(name), "{}").unwrap();
    }
    assert_eq!(ProgressLedger::pending_mappers(&ongoing), vec!["a", "b"]);
    assert!(ProgressLedger::pending_mappers(&dir.path().join("missing")).is_empty());
}

proptest! {
    /// An interrupted write (temp file never renamed) never changes what a
    /// reader loads: it sees the last committed entry.
    #[test]
    fn interrupted_commit_leaves_previous_state(
        phase in arb_phase(),
        slice in 0u64..10_000,
        torn_len in 0usize..64,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let (mut ledger, clock) = ledger(&dir);
        started(&mut ledger);
        ledger.entry.phase = Some(phase);
        ledger.entry.current_slice_index = Some(slice);
        ledger.commit().unwrap();

        let mut next = ledger.entry.clone();
        next.current_slice_index = Some(slice + 1);
        let json = serde_json::to_vec(&next).unwrap();
        fs::write(ledger.tmp_path(), &json[..torn_len.min(json.len())]).unwrap();

        let mut reread = ProgressLedger::new(ledger.path(), Arc::new(clock));
        reread.load_from_store().unwrap();
        prop_assert_eq!(reread.entry.current_slice_index, Some(slice));
        prop_assert_eq!(reread.entry.phase, Some(phase));
    }
}
