mod common;

use common::*;
use photomig_core::destination::DestinationClient;
use photomig_core::storage::AlbumRecord;
use photomig_core::verify::album::{AlbumComparison, MatchType, VERIFY_ALBUMS_PASS_ID};
use photomig_core::verify::RenderText;
use photomig_core::{
    AlbumVerifier, CancelToken, Migrator, PassJournal, PassOutcome, ProgressStore, SilentReporter,
};
use tempfile::tempdir;

fn album<'r>(albums: &'r [AlbumComparison], name: &str) -> &'r AlbumComparison {
    albums
        .iter()
        .find(|a| a.origin_album_name == name)
        .unwrap_or_else(|| panic!("no comparison for {}", name))
}

#[test]
fn test_album_membership_differences_are_reported() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_file(root, "trip/a.jpg", b"beach");
    write_file(root, "trip/b.jpg", b"dunes");
    write_file(root, "family/c.jpg", b"portrait");

    let reader = local_reader(root);
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    let journal = PassJournal::disabled();
    let migrator = Migrator::new(&reader, &client, &store, &journal, default_grouper(), fast_options(10));
    migrator.run(&SilentReporter).unwrap();
    let mut metadata = FakeMetadata::default()
        .with_album(1, "Trips", &["trip/a.jpg", "trip/b.jpg"])
        .with_album(2, "Family", &["family/c.jpg"]);
    migrator.migrate_albums(&mut metadata, &SilentReporter).unwrap();

    // Drift after migration: a phone upload lands in Trips, a new family
    // photo and a new album appear at the origin.
    let trips_id = store.get_album(1).unwrap().unwrap().dest_album_id.unwrap();
    let phone = client.seed_asset("phone.jpg", b"from the phone app");
    client.add_assets_to_album(&trips_id, &[phone]).unwrap();
    client.seed_album("Phone Uploads", &[]);
    let late = write_file(root, "family/d.jpg", b"new portrait");
    let mut metadata = FakeMetadata::default()
        .with_album(1, "Trips", &["trip/a.jpg", "trip/b.jpg"])
        .with_album(2, "Family", &["family/c.jpg", "family/d.jpg"])
        .with_album(3, "Lost", &["trip/a.jpg"]);

    let report = AlbumVerifier::new(&reader, &client, &store, 5)
        .run(&mut metadata, &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(report.total_origin_albums, 3);
    assert_eq!(report.total_destination_albums, 3);
    assert_eq!(report.matched_albums, 2);
    assert_eq!(report.origin_only, vec!["Lost"]);
    assert_eq!(report.destination_only, vec!["Phone Uploads"]);

    let trips = album(&report.albums, "Trips");
    assert_eq!(trips.match_type, MatchType::Both);
    assert_eq!(trips.matched, 2);
    assert_eq!(trips.extra_in_destination, vec!["phone.jpg"]);
    assert!(trips.missing_in_destination.is_empty());
    assert!(!trips.is_consistent());

    let family = album(&report.albums, "Family");
    assert_eq!(family.matched, 1);
    assert_eq!(family.missing_in_destination, vec![late]);
    assert_eq!(family.origin_file_count, 2);
    assert_eq!(family.dest_asset_count, 1);

    assert_eq!(album(&report.albums, "Lost").match_type, MatchType::Unmatched);

    let text = report.render_text();
    assert!(text.contains("extra-in-destination: phone.jpg"));
    assert!(text.contains("[destination-only albums]"));
}

#[test]
fn test_renamed_destination_album_still_matches_by_record() {
    let tmp = tempdir().unwrap();
    write_file(tmp.path(), "x.jpg", b"x");

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    let renamed = client.seed_album("Holiday 2019 (edited)", &[]);
    store
        .upsert_album(&AlbumRecord {
            origin_album_id: 9,
            album_name: "Holiday".to_string(),
            dest_album_id: Some(renamed.clone()),
            members_attached: true,
            created_at: String::new(),
        })
        .unwrap();
    let mut metadata = FakeMetadata::default().with_album(9, "Holiday", &[]);

    let report = AlbumVerifier::new(&reader, &client, &store, 5)
        .run(&mut metadata, &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();

    let holiday = album(&report.albums, "Holiday");
    assert_eq!(holiday.match_type, MatchType::Id);
    assert_eq!(holiday.dest_album_id.as_deref(), Some(renamed.as_str()));
    assert!(holiday.is_consistent());
    assert!(report.destination_only.is_empty());
}

#[test]
fn test_live_photo_members_share_one_destination_asset() {
    let tmp = tempdir().unwrap();
    write_file(tmp.path(), "live/IMG_5.HEIC", b"still");
    write_file(tmp.path(), "live/IMG_5.MOV", b"motion");

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    let journal = PassJournal::disabled();
    let migrator = Migrator::new(&reader, &client, &store, &journal, default_grouper(), fast_options(10));
    migrator.run(&SilentReporter).unwrap();
    let mut metadata =
        FakeMetadata::default().with_album(1, "Live", &["live/IMG_5.HEIC", "live/IMG_5.MOV"]);
    migrator.migrate_albums(&mut metadata, &SilentReporter).unwrap();

    let report = AlbumVerifier::new(&reader, &client, &store, 5)
        .run(&mut metadata, &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();

    let live = album(&report.albums, "Live");
    assert_eq!(live.origin_file_count, 2);
    assert_eq!(live.dest_asset_count, 1);
    assert_eq!(live.matched, 2);
    assert!(live.is_consistent());
}

#[test]
fn test_album_verification_resumes_from_checkpoint() {
    let tmp = tempdir().unwrap();
    write_file(tmp.path(), "a.jpg", b"a");

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    for name in ["Autumn", "Birthday", "Camping"] {
        client.seed_album(name, &[]);
    }
    let mut metadata = FakeMetadata::default()
        .with_album(1, "Autumn", &[])
        .with_album(2, "Birthday", &[])
        .with_album(3, "Camping", &[]);

    let token = CancelToken::new();
    let first = AlbumVerifier::new(&reader, &client, &store, 1)
        .with_cancel(token.clone())
        .run(&mut metadata, &CancelAfterBatch { token, batch: 0 })
        .unwrap();
    match first {
        PassOutcome::Interrupted {
            partial,
            completed_batches,
            total_batches,
        } => {
            assert_eq!((completed_batches, total_batches), (1, 3));
            assert_eq!(partial.albums.len(), 1);
            assert_eq!(partial.albums[0].origin_album_name, "Autumn");
        }
        PassOutcome::Completed(_) => panic!("album verification should have been interrupted"),
    }
    assert!(store.load_checkpoint(VERIFY_ALBUMS_PASS_ID).unwrap().is_some());

    let recorder = BatchRecorder::default();
    let report = AlbumVerifier::new(&reader, &client, &store, 1)
        .run(&mut metadata, &recorder)
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(*recorder.started.borrow(), vec![1, 2]);
    let names: Vec<&str> = report
        .albums
        .iter()
        .map(|a| a.origin_album_name.as_str())
        .collect();
    assert_eq!(names, vec!["Autumn", "Birthday", "Camping"]);
    assert!(report.albums.iter().all(|a| a.match_type == MatchType::Name));
    assert!(store.load_checkpoint(VERIFY_ALBUMS_PASS_ID).unwrap().is_none());
}

#[test]
fn test_album_checkpoint_over_changed_albums_is_discarded() {
    let tmp = tempdir().unwrap();
    write_file(tmp.path(), "a.jpg", b"a");

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();

    let mut metadata = FakeMetadata::default()
        .with_album(1, "Autumn", &[])
        .with_album(2, "Birthday", &[]);
    let token = CancelToken::new();
    let first = AlbumVerifier::new(&reader, &client, &store, 1)
        .with_cancel(token.clone())
        .run(&mut metadata, &CancelAfterBatch { token, batch: 0 })
        .unwrap();
    assert!(first.is_interrupted());

    // Autumn was deleted at the origin and Winter added: still two batches.
    let mut metadata = FakeMetadata::default()
        .with_album(2, "Birthday", &[])
        .with_album(4, "Winter", &[]);
    let recorder = BatchRecorder::default();
    let report = AlbumVerifier::new(&reader, &client, &store, 1)
        .run(&mut metadata, &recorder)
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(*recorder.started.borrow(), vec![0, 1]);
    let names: Vec<&str> = report
        .albums
        .iter()
        .map(|a| a.origin_album_name.as_str())
        .collect();
    assert_eq!(names, vec!["Birthday", "Winter"]);
}
