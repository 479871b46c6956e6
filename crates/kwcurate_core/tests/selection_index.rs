use kwcurate_core::db::open_db_in_memory;
use kwcurate_core::repo::group_repo::{GroupCatalog, SqliteGroupCatalog};
use kwcurate_core::repo::record_repo::share_connection;
use kwcurate_core::{
    FieldValue, GroupEvent, GroupSession, LedgerError, Record, RecordFilter, RecordStore,
    SessionError, SortColumn, SortKey, SqliteRecordStore, ViewSpec,
};
use std::collections::BTreeSet;

fn session_with(records: Vec<Record>) -> GroupSession<SqliteRecordStore> {
    let conn = open_db_in_memory().unwrap();
    let group_id = SqliteGroupCatalog::new(&conn)
        .create_group("Selection")
        .unwrap()
        .group_id;
    let store = SqliteRecordStore::new(share_connection(conn));
    store.upsert(group_id, &records).unwrap();
    GroupSession::open(group_id, store).unwrap()
}

fn five_records() -> Vec<Record> {
    (1..=5)
        .map(|id| Record::new(id, format!("keyword {id}")))
        .collect()
}

fn selected(session: &GroupSession<SqliteRecordStore>) -> BTreeSet<i64> {
    session.selection().ids().collect()
}

#[test]
fn shift_click_selects_range_and_survives_reverse_sort() {
    let session = session_with(five_records());

    session.click_row(1, false).unwrap();
    session.click_row(3, true).unwrap();
    assert_eq!(selected(&session), BTreeSet::from([2, 3, 4]));

    session.set_view(ViewSpec::sorted(SortKey::descending(SortColumn::Id)));

    assert_eq!(session.visible_ids(), vec![5, 4, 3, 2, 1]);
    assert_eq!(selected(&session), BTreeSet::from([2, 3, 4]));
    assert_eq!(session.position_of(2).unwrap(), 3);
    assert_eq!(session.position_of(3).unwrap(), 2);
    assert_eq!(session.position_of(4).unwrap(), 1);
}

#[test]
fn shift_range_is_idempotent() {
    let session = session_with(five_records());
    session.click_row(0, false).unwrap();
    session.click_row(2, true).unwrap();
    let once = selected(&session);

    session.click_row(2, true).unwrap();
    assert_eq!(selected(&session), once);
    assert_eq!(once, BTreeSet::from([1, 2, 3]));
}

#[test]
fn shift_click_from_deselected_anchor_extends_deselection() {
    let session = session_with(five_records());
    session.apply_filter_as_selection();

    session.click_row(4, false).unwrap();
    assert!(!session.selection().contains(5));

    session.click_row(2, true).unwrap();
    assert_eq!(selected(&session), BTreeSet::from([1, 2]));
}

#[test]
fn shift_range_uses_positions_after_reorder() {
    let session = session_with(five_records());
    session.click_row(0, false).unwrap();

    session.set_view(ViewSpec::sorted(SortKey::descending(SortColumn::Id)));
    session.click_row(2, true).unwrap();

    // anchor id 1 now sits at position 4; range covers positions 2..=4
    assert_eq!(selected(&session), BTreeSet::from([1, 2, 3]));
}

#[test]
fn shift_click_with_hidden_anchor_acts_as_plain_click() {
    let session = session_with(five_records());
    session.click_row(0, false).unwrap();

    session.set_view(ViewSpec::filtered(
        RecordFilter::default().keyword_matching("keyword [345]").unwrap(),
    ));
    session.click_row(1, true).unwrap();

    assert_eq!(selected(&session), BTreeSet::from([1, 4]));
    assert_eq!(session.selection().anchor(), Some(4));
}

#[test]
fn selection_is_stable_under_filter_changes() {
    let session = session_with(vec![
        Record::new(1, "buy shoes").with_field("max_cpc", FieldValue::Number(3.0)),
        Record::new(2, "shoes sale").with_field("max_cpc", FieldValue::Number(1.0)),
        Record::new(3, "hats"),
    ]);
    session.toggle(1).unwrap();
    session.toggle(3).unwrap();

    session.set_view(ViewSpec::filtered(
        RecordFilter::default().keyword_matching("shoes").unwrap(),
    ));
    assert_eq!(session.visible_ids(), vec![1, 2]);
    assert_eq!(selected(&session), BTreeSet::from([1, 3]));

    session.set_view(ViewSpec::sorted(SortKey::ascending(SortColumn::Field(
        "max_cpc".to_string(),
    ))));
    assert_eq!(session.visible_ids(), vec![2, 1, 3]);
    assert_eq!(selected(&session), BTreeSet::from([1, 3]));
}

#[test]
fn apply_filter_as_selection_replaces_selection_with_visible_ids() {
    let session = session_with(five_records());
    session.toggle(1).unwrap();
    session.set_view(ViewSpec::filtered(
        RecordFilter::default().keyword_matching("keyword [45]").unwrap(),
    ));

    assert_eq!(session.apply_filter_as_selection(), 2);
    assert_eq!(selected(&session), BTreeSet::from([4, 5]));
}

#[test]
fn select_only_counts_repeats_once_and_drops_unknown_ids() {
    let session = session_with(five_records());
    session.toggle(5).unwrap();

    assert_eq!(session.select_only(&[2, 2, 4, 99]), 2);
    assert_eq!(selected(&session), BTreeSet::from([2, 4]));
    assert_eq!(session.resolve_selection(), vec![2, 4]);
    assert_eq!(session.select_only(&[99]), 0);
    assert!(selected(&session).is_empty());
}

#[test]
fn resolve_selection_returns_display_order_and_drops_trashed() {
    let session = session_with(five_records());
    session.apply_filter_as_selection();
    session.move_to_trash(&[2], 1_000).unwrap();
    session.set_view(ViewSpec::sorted(SortKey::descending(SortColumn::Id)));

    assert_eq!(session.resolve_selection(), vec![5, 4, 3, 1]);
}

#[test]
fn resolve_selection_includes_selected_ids_hidden_by_filter() {
    let session = session_with(five_records());
    session.toggle(5).unwrap();
    session.toggle(1).unwrap();
    session.set_view(ViewSpec::filtered(
        RecordFilter::default().keyword_matching("keyword 5").unwrap(),
    ));

    assert_eq!(session.resolve_selection(), vec![5, 1]);
}

#[test]
fn purged_ids_are_dropped_from_selection() {
    let session = session_with(five_records());
    session.toggle(2).unwrap();
    session.toggle(3).unwrap();
    session.move_to_trash(&[2], 0).unwrap();
    session.delete_permanently(&[2]).unwrap();

    assert_eq!(selected(&session), BTreeSet::from([3]));
}

#[test]
fn index_lookups_report_out_of_range_positions() {
    let session = session_with(five_records());
    assert!(matches!(session.id_at(5), Err(SessionError::Index(_))));
    assert!(matches!(
        session.toggle(42),
        Err(SessionError::Ledger(LedgerError::NotFound(42)))
    ));
    assert_eq!(session.resolve_range(4, 3).unwrap(), vec![4, 5]);
}

#[test]
fn observers_receive_view_and_selection_events() {
    let session = session_with(five_records());
    let mut events = session.subscribe();

    session.set_view(ViewSpec::sorted(SortKey::ascending(SortColumn::Keyword)));
    session.click_row(0, false).unwrap();

    assert_eq!(
        events.try_recv().unwrap(),
        GroupEvent::ViewChanged { view_revision: 1 }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        GroupEvent::SelectionChanged { selected: 1 }
    );
}
