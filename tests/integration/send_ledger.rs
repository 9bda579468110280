use crate::helpers::date;
use nudge::ledger::{JsonlSendLedger, SendLedger};
use nudge::model::{SendKey, SendKind, UserId};
use nudge::store::SqliteStore;
use std::sync::{Arc, Barrier};
use std::thread;

fn assert_ledger_contract(ledger: &dyn SendLedger) {
    let key = SendKey::new(UserId(42), SendKind::Prompt, date(2026, 1, 5), 9);

    assert!(!ledger.was_sent(&key).unwrap());
    assert!(ledger.mark_sent(&key).unwrap());
    assert!(ledger.was_sent(&key).unwrap());
    assert!(!ledger.mark_sent(&key).unwrap(), "duplicate is a no-op");

    // Every component of the key is significant.
    for other in [
        SendKey::new(UserId(43), SendKind::Prompt, date(2026, 1, 5), 9),
        SendKey::new(UserId(42), SendKind::Digest, date(2026, 1, 5), 9),
        SendKey::new(UserId(42), SendKind::Prompt, date(2026, 1, 6), 9),
        SendKey::new(UserId(42), SendKind::Prompt, date(2026, 1, 5), 10),
    ] {
        assert!(!ledger.was_sent(&other).unwrap(), "{other} must be distinct");
    }
}

#[test]
fn sqlite_ledger_honours_contract() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert_ledger_contract(&store);
}

#[test]
fn jsonl_ledger_honours_contract() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = JsonlSendLedger::new(dir.path().join("sends.jsonl"));
    assert_ledger_contract(&ledger);
}

#[test]
fn sqlite_ledger_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.db");
    let key = SendKey::new(UserId(7), SendKind::Digest, date(2026, 2, 1), 8);

    SqliteStore::open(&path).unwrap().mark_sent(&key).unwrap();
    let reopened = SqliteStore::open(&path).unwrap();
    assert!(reopened.was_sent(&key).unwrap());
}

#[test]
fn jsonl_instances_sharing_a_file_record_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sends.jsonl");
    let key = SendKey::new(UserId(1), SendKind::Digest, date(2026, 3, 3), 8);
    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let ledger = JsonlSendLedger::new(path.clone());
            thread::spawn(move || {
                barrier.wait();
                ledger.mark_sent(&key).unwrap()
            })
        })
        .collect();

    let inserted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|newly| *newly)
        .count();
    assert_eq!(inserted, 1);

    let lines = std::fs::read_to_string(&path).unwrap();
    assert_eq!(lines.lines().count(), 1);
    assert!(!path.with_extension("lock").exists());
}

#[test]
fn jsonl_records_are_readable_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sends.jsonl");
    let ledger = JsonlSendLedger::new(path.clone());
    ledger
        .mark_sent(&SendKey::new(UserId(5), SendKind::Carry, date(2026, 4, 1), 8))
        .unwrap();

    let line = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(value["user_id"], 5);
    assert_eq!(value["kind"], "carry");
    assert_eq!(value["day"], "2026-04-01");
    assert_eq!(value["hour"], 8);
    assert!(value["recorded_at_ms"].as_u64().is_some());
}
