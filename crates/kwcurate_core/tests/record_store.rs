use kwcurate_core::db::open_db_in_memory;
use kwcurate_core::repo::group_repo::{CampaignStatus, GroupCatalog, SqliteGroupCatalog};
use kwcurate_core::repo::record_repo::share_connection;
use kwcurate_core::repo::settings_repo::{SettingsRepository, SqliteSettingsRepository};
use kwcurate_core::{
    BatchTag, FieldValue, Record, RecordStore, RepoError, ReviewState, SqliteRecordStore,
};

fn store_with_group() -> (SqliteRecordStore, i64) {
    let conn = open_db_in_memory().unwrap();
    let group_id = SqliteGroupCatalog::new(&conn)
        .create_group("Shoes")
        .unwrap()
        .group_id;
    (SqliteRecordStore::new(share_connection(conn)), group_id)
}

#[test]
fn upsert_and_list_roundtrip_preserves_insertion_order() {
    let (store, group_id) = store_with_group();
    let records = vec![
        Record::new(3, "red shoes").with_field("max_cpc", FieldValue::Number(2.5)),
        Record::new(1, "blue shoes").with_field("has_ads", FieldValue::Flag(true)),
        Record::new(2, "green shoes").with_field("comment", FieldValue::text("check later")),
    ];
    store.upsert(group_id, &records).unwrap();

    let loaded = store.list(group_id).unwrap();
    assert_eq!(loaded, records);
}

#[test]
fn upsert_replaces_existing_record_in_place() {
    let (store, group_id) = store_with_group();
    store
        .upsert(group_id, &[Record::new(1, "a"), Record::new(2, "b")])
        .unwrap();

    let mut staged = Record::new(1, "a");
    staged.stage(BatchTag::generate());
    staged.accept();
    store.upsert(group_id, &[staged.clone()]).unwrap();

    let loaded = store.list(group_id).unwrap();
    assert_eq!(loaded[0], staged);
    assert_eq!(loaded[0].review, ReviewState::Accepted);
    assert_eq!(loaded[1].id, 2);
}

#[test]
fn upsert_rejects_invalid_records_before_writing() {
    let (store, group_id) = store_with_group();
    let err = store
        .upsert(group_id, &[Record::new(1, "ok"), Record::new(2, "   ")])
        .unwrap_err();

    assert!(matches!(err, RepoError::Validation(_)));
    assert!(store.list(group_id).unwrap().is_empty());
}

#[test]
fn unknown_group_is_reported() {
    let (store, _) = store_with_group();
    assert!(matches!(store.list(404), Err(RepoError::GroupNotFound(404))));
    assert!(matches!(
        store.upsert(404, &[Record::new(1, "kw")]),
        Err(RepoError::GroupNotFound(404))
    ));
}

#[test]
fn delete_counts_removed_rows() {
    let (store, group_id) = store_with_group();
    store
        .upsert(group_id, &[Record::new(1, "a"), Record::new(2, "b")])
        .unwrap();

    assert_eq!(store.delete(group_id, &[1, 99]).unwrap(), 1);
    let ids: Vec<_> = store
        .list(group_id)
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(ids, vec![2]);
}

#[test]
fn next_record_id_survives_deletes() {
    let (store, group_id) = store_with_group();
    assert_eq!(store.next_record_id(group_id).unwrap(), 1);

    store
        .upsert(group_id, &[Record::new(1, "a"), Record::new(3, "c")])
        .unwrap();
    assert_eq!(store.next_record_id(group_id).unwrap(), 4);

    store.delete(group_id, &[3, 1]).unwrap();
    assert_eq!(store.next_record_id(group_id).unwrap(), 4);

    store.upsert(group_id, &[Record::new(2, "b")]).unwrap();
    assert_eq!(store.next_record_id(group_id).unwrap(), 4);
    assert!(matches!(
        store.next_record_id(404),
        Err(RepoError::GroupNotFound(404))
    ));
}

#[test]
fn update_field_sets_and_clears_json_fields() {
    let (store, group_id) = store_with_group();
    store
        .upsert(
            group_id,
            &[
                Record::new(1, "a").with_field("comment", FieldValue::text("old")),
                Record::new(2, "b"),
            ],
        )
        .unwrap();

    let changed = store
        .update_field(group_id, &[1, 2], "max_cpc", Some(&FieldValue::Number(1.75)))
        .unwrap();
    assert_eq!(changed, 2);
    store
        .update_field(group_id, &[1], "comment", None)
        .unwrap();

    let loaded = store.list(group_id).unwrap();
    assert_eq!(loaded[0].field("max_cpc"), Some(&FieldValue::Number(1.75)));
    assert_eq!(loaded[0].field("comment"), None);
    assert_eq!(loaded[1].field("max_cpc"), Some(&FieldValue::Number(1.75)));
}

#[test]
fn update_field_rejects_non_identifier_names() {
    let (store, group_id) = store_with_group();
    store.upsert(group_id, &[Record::new(1, "a")]).unwrap();

    let err = store
        .update_field(group_id, &[1], "a.b", Some(&FieldValue::Flag(true)))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn trashed_record_roundtrips_with_deleted_at() {
    let (store, group_id) = store_with_group();
    let mut record = Record::new(1, "kw");
    record.soft_delete(1_700_000_000_000);
    store.upsert(group_id, &[record.clone()]).unwrap();

    assert_eq!(store.list(group_id).unwrap(), vec![record]);
}

#[test]
fn group_catalog_lists_in_creation_order_and_rejects_blank_names() {
    let conn = open_db_in_memory().unwrap();
    let catalog = SqliteGroupCatalog::new(&conn);
    let first = catalog.create_group("  Shoes ").unwrap();
    let second = catalog.create_group("Hats").unwrap();

    assert_eq!(first.name, "Shoes");
    let names: Vec<_> = catalog
        .list_groups()
        .unwrap()
        .into_iter()
        .map(|group| group.name)
        .collect();
    assert_eq!(names, vec!["Shoes", "Hats"]);
    assert_eq!(catalog.get_group(second.group_id).unwrap(), Some(second));
    assert!(matches!(
        catalog.create_group("   "),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn campaigns_own_groups() {
    let conn = open_db_in_memory().unwrap();
    let catalog = SqliteGroupCatalog::new(&conn);
    let search = catalog.create_campaign(" Search ").unwrap();
    let display = catalog.create_campaign("Display").unwrap();
    assert_eq!(search.name, "Search");
    assert_eq!(search.status, CampaignStatus::Enabled);

    let shoes = catalog.create_group_in(search.campaign_id, "Shoes").unwrap();
    catalog.create_group_in(display.campaign_id, "Banners").unwrap();
    let loose = catalog.create_group("Loose").unwrap();
    let hats = catalog.create_group_in(search.campaign_id, "Hats").unwrap();

    assert_eq!(shoes.campaign_id, Some(search.campaign_id));
    assert_eq!(loose.campaign_id, None);
    let in_search: Vec<_> = catalog
        .list_groups_in(search.campaign_id)
        .unwrap()
        .into_iter()
        .map(|group| group.group_id)
        .collect();
    assert_eq!(in_search, vec![shoes.group_id, hats.group_id]);
    assert_eq!(catalog.list_groups().unwrap().len(), 4);

    catalog
        .set_campaign_status(display.campaign_id, CampaignStatus::Paused)
        .unwrap();
    let statuses: Vec<_> = catalog
        .list_campaigns()
        .unwrap()
        .into_iter()
        .map(|campaign| campaign.status)
        .collect();
    assert_eq!(statuses, vec![CampaignStatus::Enabled, CampaignStatus::Paused]);
}

#[test]
fn unknown_campaign_is_reported() {
    let conn = open_db_in_memory().unwrap();
    let catalog = SqliteGroupCatalog::new(&conn);
    assert!(matches!(
        catalog.create_group_in(77, "Orphan"),
        Err(RepoError::CampaignNotFound(77))
    ));
    assert!(matches!(
        catalog.list_groups_in(77),
        Err(RepoError::CampaignNotFound(77))
    ));
    assert!(matches!(
        catalog.set_campaign_status(77, CampaignStatus::Removed),
        Err(RepoError::CampaignNotFound(77))
    ));
    assert!(catalog.list_groups().unwrap().is_empty());
}

#[test]
fn retention_setting_persists() {
    let conn = open_db_in_memory().unwrap();
    let settings = SqliteSettingsRepository::new(&conn);
    assert_eq!(settings.trash_retention_days().unwrap(), None);

    settings.set_trash_retention_days(14).unwrap();
    settings.set_trash_retention_days(7).unwrap();
    assert_eq!(settings.trash_retention_days().unwrap(), Some(7));
}
