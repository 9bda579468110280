use crate::helpers::date;
use nudge::carry::{CarryOutcome, CarryOverEngine};
use nudge::ledger::JsonlSendLedger;
use nudge::model::{DueTime, NewTask, Priority, TaskStatus, UserId};
use nudge::store::{SqliteStore, TaskStore};
use std::sync::Arc;

#[test]
fn copies_keep_attributes_and_leave_sources_untouched() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = UserId(11);
    let due: DueTime = "18:00".parse().unwrap();
    let source = store
        .insert_task(
            &NewTask::new(user, "Finish module", date(2026, 5, 4))
                .with_priority(Priority::High)
                .with_due_time(due)
                .with_tags(vec!["#study".to_owned()]),
        )
        .unwrap();

    let engine = CarryOverEngine::new(store.clone(), store.clone());
    assert_eq!(engine.carry_over(user, date(2026, 5, 5)).unwrap(), 1);

    let copy = &store.list_tasks(user, date(2026, 5, 5), None).unwrap()[0];
    assert_eq!(copy.title, "Finish module");
    assert_eq!(copy.priority, Priority::High);
    assert_eq!(copy.due_time, Some(due));
    assert_eq!(copy.tags, vec!["#study".to_owned()]);
    assert_eq!(copy.status, TaskStatus::Open);
    assert_eq!(copy.carried_from, Some(source));

    let original = &store.list_tasks(user, date(2026, 5, 4), None).unwrap()[0];
    assert_eq!(original.id, source);
    assert_eq!(original.status, TaskStatus::Open);
}

#[test]
fn copies_are_inserted_in_the_order_originals_were_added() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = UserId(12);
    let mut sources = Vec::new();
    for (title, priority) in [
        ("Dishes", Priority::Low),
        ("Pitch deck", Priority::High),
        ("Groceries", Priority::Med),
    ] {
        sources.push(
            store
                .insert_task(&NewTask::new(user, title, date(2026, 5, 4)).with_priority(priority))
                .unwrap(),
        );
    }

    let engine = CarryOverEngine::new(store.clone(), store.clone());
    assert_eq!(engine.carry_over(user, date(2026, 5, 5)).unwrap(), 3);

    let mut copies = store.list_tasks(user, date(2026, 5, 5), None).unwrap();
    copies.sort_by_key(|t| t.id);
    let origins: Vec<_> = copies.iter().map(|t| t.carried_from.unwrap()).collect();
    assert_eq!(origins, sources);
}

#[test]
fn ungated_carry_runs_duplicate_copies() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = UserId(11);
    store
        .insert_task(&NewTask::new(user, "Stretch", date(2026, 5, 4)))
        .unwrap();

    let engine = CarryOverEngine::new(store.clone(), store.clone());
    engine.carry_over(user, date(2026, 5, 5)).unwrap();
    engine.carry_over(user, date(2026, 5, 5)).unwrap();
    assert_eq!(store.list_tasks(user, date(2026, 5, 5), None).unwrap().len(), 2);
}

#[test]
fn carry_only_touches_the_requesting_user() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .insert_task(&NewTask::new(UserId(1), "Mine", date(2026, 5, 4)))
        .unwrap();
    store
        .insert_task(&NewTask::new(UserId(2), "Theirs", date(2026, 5, 4)))
        .unwrap();

    let engine = CarryOverEngine::new(store.clone(), store.clone());
    assert_eq!(engine.carry_over(UserId(1), date(2026, 5, 5)).unwrap(), 1);
    assert!(
        store
            .list_tasks(UserId(2), date(2026, 5, 5), None)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn jsonl_gate_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("sends.jsonl");
    let store = Arc::new(SqliteStore::open(&dir.path().join("tasks.db")).unwrap());
    let user = UserId(3);
    store
        .insert_task(&NewTask::new(user, "Water plants", date(2026, 5, 31)))
        .unwrap();

    let first = CarryOverEngine::new(
        store.clone(),
        Arc::new(JsonlSendLedger::new(ledger_path.clone())),
    );
    assert_eq!(
        first.carry_over_once(user, date(2026, 6, 1), 8).unwrap(),
        CarryOutcome::Carried(1)
    );

    // A fresh engine with a cold cache must still see the recorded slot.
    let second = CarryOverEngine::new(store.clone(), Arc::new(JsonlSendLedger::new(ledger_path)));
    assert_eq!(
        second.carry_over_once(user, date(2026, 6, 1), 8).unwrap(),
        CarryOutcome::Skipped
    );
    // A different hour is a different slot.
    assert_eq!(
        second
            .carry_over_once(user, date(2026, 6, 1), 9)
            .unwrap()
            .carried(),
        1
    );
}
