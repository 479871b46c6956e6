use kwcurate_core::db::open_db_in_memory;
use kwcurate_core::engine::trash::DAY_MS;
use kwcurate_core::repo::group_repo::{GroupCatalog, SqliteGroupCatalog};
use kwcurate_core::repo::record_repo::share_connection;
use kwcurate_core::{
    FieldValue, GroupSession, LedgerError, LifecycleState, Record, RecordStore, RetentionHorizon,
    SessionError, SqliteRecordStore,
};
use std::sync::Arc;
use std::thread;

fn session_with(records: Vec<Record>) -> GroupSession<SqliteRecordStore> {
    let conn = open_db_in_memory().unwrap();
    let group_id = SqliteGroupCatalog::new(&conn)
        .create_group("Trash")
        .unwrap()
        .group_id;
    let store = SqliteRecordStore::new(share_connection(conn));
    store.upsert(group_id, &records).unwrap();
    GroupSession::open(group_id, store).unwrap()
}

#[test]
fn trash_round_trip_restores_identical_record() {
    let session = empty_with_accepted_record();
    let original = session.record(1).unwrap();

    assert_eq!(session.move_to_trash(&[1], 5_000).unwrap(), 1);
    let trashed = session.record(1).unwrap();
    assert_eq!(trashed.lifecycle, LifecycleState::Trashed);
    assert_eq!(trashed.deleted_at, Some(5_000));

    assert_eq!(session.restore(&[1]).unwrap(), 1);
    assert_eq!(session.record(1).unwrap(), original);
    assert_eq!(
        session.store().list(session.group_id()).unwrap(),
        vec![original]
    );
}

#[test]
fn restoring_trashed_while_new_record_re_enters_new() {
    let session = session_with(Vec::new());
    session.add_keywords("pending").unwrap();

    session.move_to_trash(&[1], 0).unwrap();
    assert_eq!(session.pending_count(), 0);
    session.restore(&[1]).unwrap();

    assert!(session.record(1).unwrap().is_new());
    assert_eq!(session.pending_count(), 1);
}

#[test]
fn retrash_counts_zero_and_keeps_original_timestamp() {
    let session = session_with(vec![Record::new(1, "a"), Record::new(2, "b")]);
    session.move_to_trash(&[1], 100).unwrap();

    assert_eq!(session.move_to_trash(&[1, 2], 200).unwrap(), 1);
    assert_eq!(session.record(1).unwrap().deleted_at, Some(100));
    assert_eq!(session.record(2).unwrap().deleted_at, Some(200));
}

#[test]
fn invalid_transitions_are_errors() {
    let session = session_with(vec![Record::new(1, "a"), Record::new(2, "b")]);

    assert!(matches!(
        session.restore(&[1]),
        Err(SessionError::Ledger(LedgerError::InvalidTransition { id: 1, .. }))
    ));

    session.move_to_trash(&[2], 0).unwrap();
    session.delete_permanently(&[2]).unwrap();
    assert!(matches!(
        session.move_to_trash(&[2], 10),
        Err(SessionError::Ledger(LedgerError::InvalidTransition { id: 2, .. }))
    ));
    assert!(matches!(
        session.delete_permanently(&[1]),
        Err(SessionError::Ledger(LedgerError::InvalidTransition { id: 1, .. }))
    ));
}

#[test]
fn purge_boundary_matches_days_remaining() {
    let session = session_with(vec![Record::new(1, "a"), Record::new(2, "b")]);
    let horizon = RetentionHorizon::from_days(30);
    session.move_to_trash(&[1], 0).unwrap();
    session.move_to_trash(&[2], 1).unwrap();

    let boundary = 30 * DAY_MS;
    assert_eq!(session.days_remaining(1, boundary, horizon).unwrap(), 0);
    assert_eq!(session.days_remaining(2, boundary, horizon).unwrap(), 1);

    assert_eq!(session.purge_expired(boundary, horizon).unwrap(), 1);
    assert!(session.record(1).is_none());
    assert!(session.record(2).is_some());

    assert_eq!(session.purge_expired(boundary, horizon).unwrap(), 0);
    assert_eq!(session.purge_expired(boundary + 1, horizon).unwrap(), 1);
    assert!(session.store().list(session.group_id()).unwrap().is_empty());
}

#[test]
fn trash_entries_report_days_remaining_newest_first() {
    let session = session_with(vec![Record::new(1, "a"), Record::new(2, "b"), Record::new(3, "c")]);
    session.move_to_trash(&[1], 0).unwrap();
    session.move_to_trash(&[2], DAY_MS).unwrap();
    let horizon = RetentionHorizon::from_days(7);

    let entries = session.trash_entries(2 * DAY_MS, horizon);

    let summary: Vec<_> = entries
        .iter()
        .map(|entry| (entry.record.id, entry.days_remaining))
        .collect();
    assert_eq!(summary, vec![(2, 6), (1, 5)]);
}

#[test]
fn days_remaining_requires_a_trashed_record() {
    let session = session_with(vec![Record::new(1, "a")]);
    let horizon = RetentionHorizon::from_days(30);
    assert!(matches!(
        session.days_remaining(1, 0, horizon),
        Err(SessionError::Ledger(LedgerError::InvalidTransition { .. }))
    ));
    assert!(matches!(
        session.days_remaining(9, 0, horizon),
        Err(SessionError::Ledger(LedgerError::NotFound(9)))
    ));
}

#[test]
fn racing_restore_and_purge_leave_exactly_one_outcome() {
    for _ in 0..20 {
        let session = Arc::new(session_with(vec![Record::new(1, "raced")]));
        session.move_to_trash(&[1], 0).unwrap();
        let horizon = RetentionHorizon::from_days(1);

        let restorer = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.restore(&[1]))
        };
        let purger = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.purge_expired(DAY_MS, horizon))
        };
        let restored = restorer.join().unwrap();
        let purged = purger.join().unwrap().unwrap();

        match session.record(1) {
            Some(record) => {
                assert_eq!(restored.unwrap(), 1);
                assert_eq!(purged, 0);
                assert!(record.is_active());
            }
            None => {
                assert_eq!(purged, 1);
                assert!(matches!(
                    restored,
                    Err(SessionError::Ledger(LedgerError::InvalidTransition { id: 1, .. }))
                ));
            }
        }
        let stored = session.store().list(session.group_id()).unwrap();
        assert_eq!(stored.len(), usize::from(session.record(1).is_some()));
    }
}

fn empty_with_accepted_record() -> GroupSession<SqliteRecordStore> {
    let session = session_with(Vec::new());
    session.add_keywords("accepted kw").unwrap();
    session.accept_all().unwrap();
    session
        .update_field(&[1], "comment", Some(FieldValue::text("keep me")))
        .unwrap();
    session
}
