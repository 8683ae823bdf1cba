mod common;

use std::collections::HashSet;
use std::fs;

use common::*;
use photomig_core::fingerprint::fingerprint;
use photomig_core::reader::file_name;
use photomig_core::storage::{Checkpoint, FileRecord, FileStatus};
use photomig_core::verify::{Classification, VerificationReport, VERIFY_PASS_ID};
use photomig_core::{
    CancelToken, Migrator, PassJournal, PassOutcome, ProgressStore, SilentReporter, Verifier,
};
use tempfile::tempdir;

fn classification_of(report: &VerificationReport, key: &str) -> Classification {
    report
        .results
        .iter()
        .find(|r| r.key == key)
        .map(|r| r.classification)
        .unwrap_or_else(|| panic!("no result for {}", key))
}

#[test]
fn test_three_way_reconciliation() {
    let tmp = tempdir().unwrap();
    let migrated = write_file(tmp.path(), "2020/a.jpg", b"alpha");

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    let journal = PassJournal::disabled();
    Migrator::new(&reader, &client, &store, &journal, default_grouper(), fast_options(10))
        .run(&SilentReporter)
        .unwrap();
    let stray = client.seed_asset("stray.jpg", b"uploaded by phone");

    // b.jpg is catalogued but no longer on disk.
    let metadata_paths = vec!["2020/a.jpg".to_string(), "2020/b.jpg".to_string()];
    let report = Verifier::new(&reader, &client, &store, 10)
        .run(&metadata_paths, &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();

    let missing = tmp.path().join("2020").join("b.jpg").to_string_lossy().into_owned();
    assert_eq!(classification_of(&report, &migrated), Classification::Matched);
    assert_eq!(classification_of(&report, &missing), Classification::MetadataOnly);
    assert_eq!(classification_of(&report, &stray), Classification::DestinationOnly);

    assert_eq!(report.origin_files, 1);
    assert_eq!(report.metadata_files, 2);
    assert_eq!(report.destination_assets, 2);
    assert_eq!(report.counts.total(), 3);
    assert_eq!(report.counts.matched, 1);
    assert_eq!(report.counts.metadata_only, 1);
    assert_eq!(report.counts.destination_only, 1);
    assert!(!report.is_clean());
}

#[test]
fn test_every_key_lands_in_one_bucket() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_file(root, "uploaded.jpg", b"uploaded");
    write_file(root, "IMG_1.HEIC", b"live still");
    write_file(root, "IMG_1.MOV", b"live motion");

    let reader = local_reader(root);
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    let journal = PassJournal::disabled();
    Migrator::new(&reader, &client, &store, &journal, default_grouper(), fast_options(10))
        .run(&SilentReporter)
        .unwrap();
    write_file(root, "local_only.jpg", b"never uploaded");
    client.seed_asset("other.jpg", b"elsewhere");

    let metadata_paths = vec!["uploaded.jpg".to_string(), "gone.jpg".to_string()];
    let report = Verifier::new(&reader, &client, &store, 2)
        .run(&metadata_paths, &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();

    let keys: Vec<&str> = report.results.iter().map(|r| r.key.as_str()).collect();
    let unique: HashSet<&str> = keys.iter().copied().collect();
    assert_eq!(keys.len(), unique.len());

    // 4 origin files + 1 catalogue-only path + 1 unlinked asset.
    assert_eq!(report.counts.total(), 6);
    let bucket_sum: usize = Classification::ALL
        .iter()
        .map(|c| report.counts.get(*c))
        .sum();
    assert_eq!(bucket_sum, report.results.len());

    // The motion clip travels inside the still's asset and still matches.
    let motion = root.join("IMG_1.MOV").to_string_lossy().into_owned();
    assert_eq!(classification_of(&report, &motion), Classification::Matched);
    let local_only = root.join("local_only.jpg").to_string_lossy().into_owned();
    assert_eq!(classification_of(&report, &local_only), Classification::OriginOnly);
    assert_eq!(report.counts.matched, 3);
}

#[test]
fn test_changed_content_is_a_hash_mismatch() {
    let tmp = tempdir().unwrap();
    let path = write_file(tmp.path(), "edited.jpg", b"edited after upload");

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let asset_id = client.seed_asset("edited.jpg", b"original upload");
    let store = ProgressStore::open_in_memory().unwrap();
    store
        .upsert_file(&FileRecord {
            fingerprint: Some(fingerprint(b"original upload")),
            asset_id: Some(asset_id.clone()),
            ..FileRecord::new(path.clone(), FileStatus::Success)
        })
        .unwrap();

    let report = Verifier::new(&reader, &client, &store, 10)
        .run(&[], &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();

    let result = report.results.iter().find(|r| r.key == path).unwrap();
    assert_eq!(result.classification, Classification::HashMismatch);
    assert_eq!(result.asset_id.as_deref(), Some(asset_id.as_str()));
    assert!(result.detail.is_some());
    // The linked asset is not also reported as destination-only.
    assert_eq!(report.counts.destination_only, 0);
}

#[test]
fn test_unrecorded_file_links_by_content() {
    let tmp = tempdir().unwrap();
    let path = write_file(tmp.path(), "copied.jpg", b"same bytes");

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let asset_id = client.seed_asset("renamed.jpg", b"same bytes");
    let store = ProgressStore::open_in_memory().unwrap();

    let report = Verifier::new(&reader, &client, &store, 10)
        .run(&[], &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();

    assert!(report.is_clean());
    let result = report.results.iter().find(|r| r.key == path).unwrap();
    assert_eq!(result.classification, Classification::Matched);
    assert_eq!(result.asset_id.as_deref(), Some(asset_id.as_str()));
    assert!(store.list_files().unwrap().is_empty());
}

#[test]
fn test_resume_after_interruption_matches_uninterrupted_run() {
    let tmp = tempdir().unwrap();
    for i in 0..10 {
        write_file(tmp.path(), &format!("photo_{:02}.jpg", i), format!("photo {}", i).as_bytes());
    }

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    let journal = PassJournal::disabled();
    Migrator::new(&reader, &client, &store, &journal, default_grouper(), fast_options(4))
        .run(&SilentReporter)
        .unwrap();
    client.seed_asset("extra.jpg", b"not from origin");

    let token = CancelToken::new();
    let interrupted = Verifier::new(&reader, &client, &store, 1)
        .with_cancel(token.clone())
        .run(&[], &CancelAfterBatch { token, batch: 2 })
        .unwrap();
    match interrupted {
        PassOutcome::Interrupted {
            partial,
            completed_batches,
            total_batches,
        } => {
            assert_eq!(completed_batches, 3);
            assert_eq!(total_batches, 10);
            assert_eq!(partial.results.len(), 3);
        }
        PassOutcome::Completed(_) => panic!("verification should have been interrupted"),
    }
    let checkpoint = store.load_checkpoint(VERIFY_PASS_ID).unwrap().unwrap();
    assert_eq!(checkpoint.last_batch, 2);

    let recorder = BatchRecorder::default();
    let resumed = Verifier::new(&reader, &client, &store, 1)
        .run(&[], &recorder)
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(*recorder.started.borrow(), (3..10).collect::<Vec<_>>());
    assert!(store.load_checkpoint(VERIFY_PASS_ID).unwrap().is_none());

    let fresh = Verifier::new(&reader, &client, &store, 1)
        .run(&[], &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(resumed.results, fresh.results);
    assert_eq!(resumed.counts, fresh.counts);
    assert_eq!(resumed.counts.matched, 10);
    assert_eq!(resumed.counts.destination_only, 1);
}

#[test]
fn test_checkpoint_from_other_layout_is_discarded() {
    let tmp = tempdir().unwrap();
    for i in 0..4 {
        write_file(tmp.path(), &format!("{}.jpg", i), format!("{}", i).as_bytes());
    }

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    store
        .save_checkpoint_batch(
            &Checkpoint {
                pass_id: VERIFY_PASS_ID.to_string(),
                last_batch: 0,
                total_batches: 1,
                batch_size: 50,
                key_digest: String::new(),
            },
            &["not a comparison result".to_string()],
        )
        .unwrap();

    let recorder = BatchRecorder::default();
    let report = Verifier::new(&reader, &client, &store, 2)
        .run(&[], &recorder)
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(*recorder.started.borrow(), vec![0, 1]);
    assert_eq!(report.results.len(), 4);
    assert_eq!(report.counts.origin_only, 4);
}

#[test]
fn test_failed_asset_lookup_fails_the_pass() {
    let tmp = tempdir().unwrap();
    let path = write_file(tmp.path(), "a.jpg", b"alpha");

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();
    store
        .upsert_file(&FileRecord {
            fingerprint: Some(fingerprint(b"alpha")),
            asset_id: Some("asset-1".to_string()),
            ..FileRecord::new(path, FileStatus::Success)
        })
        .unwrap();

    // The listing omits the asset and the direct lookup cannot reach the server.
    client.set_lookups_offline(true);
    let outcome = Verifier::new(&reader, &client, &store, 10).run(&[], &SilentReporter);
    assert!(outcome.is_err());
    assert!(store.load_checkpoint(VERIFY_PASS_ID).unwrap().is_none());

    // A lookup that answers "not found" is a genuine miss.
    client.set_lookups_offline(false);
    let report = Verifier::new(&reader, &client, &store, 10)
        .run(&[], &SilentReporter)
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(report.counts.origin_only, 1);
}

#[test]
fn test_checkpoint_over_changed_keys_is_discarded() {
    let tmp = tempdir().unwrap();
    for name in ["b.jpg", "c.jpg", "d.jpg", "e.jpg"] {
        write_file(tmp.path(), name, name.as_bytes());
    }

    let reader = local_reader(tmp.path());
    let client = FakeDestination::new();
    let store = ProgressStore::open_in_memory().unwrap();

    let token = CancelToken::new();
    let first = Verifier::new(&reader, &client, &store, 2)
        .with_cancel(token.clone())
        .run(&[], &CancelAfterBatch { token, batch: 0 })
        .unwrap();
    assert!(first.is_interrupted());

    // Same number of batches, different keys.
    write_file(tmp.path(), "a.jpg", b"a.jpg");
    fs::remove_file(tmp.path().join("e.jpg")).unwrap();

    let recorder = BatchRecorder::default();
    let report = Verifier::new(&reader, &client, &store, 2)
        .run(&[], &recorder)
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(*recorder.started.borrow(), vec![0, 1]);
    let keys: Vec<String> = report
        .results
        .iter()
        .map(|r| file_name(&r.key).to_string())
        .collect();
    assert_eq!(keys, vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
    assert_eq!(report.counts.origin_only, 4);
}
