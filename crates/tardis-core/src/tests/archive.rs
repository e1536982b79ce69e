use std::io::Read;

use flate2::read::GzDecoder;
use tardis_transfer::testutil::Op;
use tardis_types::TardisError;
use tardis_types::datafile::ARCHIVE_PROTOCOL;

use crate::archive::{
    ArchiveOptions, ArchiveTarget, archive_experiment, archive_name, remove_archived_data,
};
use crate::catalog::{Catalog, last_experiment_change};
use crate::config::PathMapper;
use crate::testutil::{ARCHIVE_BASE, Fixture, REMOTE_BASE};

/// Bytes gzip cannot shrink much.
fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

fn members(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    tar.entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (name, data)
        })
        .collect()
}

fn experiment_with_two_files(fx: &Fixture) {
    fx.add_experiment(1, &["alice"]);
    fx.add_dataset(10, &[1]);
    fx.add_verified(100, 10, "1/a.txt", b"alpha");
    fx.add_verified(101, 10, "1/b.txt", b"beta");
}

#[test]
fn packages_manifest_first_then_datafiles() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    let ctx = fx.session.archive_context();

    let result = archive_experiment(
        &ctx,
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions::default(),
    )
    .unwrap();

    let archive = &result.archive;
    assert_eq!(archive.id, 1);
    assert_eq!(archive.nos_files, 2);
    assert_eq!(archive.nos_errors, 0);
    assert_eq!(archive.experiment_owner, "alice");
    assert_eq!(archive.experiment_changed, last_experiment_change(fx.catalog(), 1).unwrap());
    let url = archive.url.clone().unwrap();
    assert!(url.starts_with(ARCHIVE_BASE));
    assert!(url.ends_with(".tar.gz"));

    let stored = fx.vault.object(&url).unwrap();
    assert_eq!(stored.len() as u64, archive.size);
    let entries = members(&stored);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["manifest.json", "10/a.txt", "10/b.txt"]);
    assert_eq!(entries[1].1, b"alpha");

    let manifest: serde_json::Value = serde_json::from_slice(&entries[0].1).unwrap();
    assert_eq!(manifest["experiment"]["id"], 1);
    assert_eq!(manifest["datafiles"].as_array().unwrap().len(), 2);

    assert_eq!(fx.catalog().archives_for_experiment(1).unwrap().len(), 1);
    assert!(fx.session.store.exists("1/a.txt"));
}

#[test]
fn flat_mapper_and_remote_datafiles() {
    let fx = Fixture::new();
    fx.add_experiment(1, &[]);
    fx.add_dataset(10, &[1]);
    fx.add_verified(100, 10, "x/data.bin", b"local");
    let remote_url = format!("{REMOTE_BASE}elsewhere/data.bin");
    let mut remote = tardis_types::Datafile::new(101, 10, "data.bin", &remote_url);
    remote.verified = true;
    fx.catalog().save_datafile(&remote).unwrap();
    fx.remote.insert(&remote_url, b"from afar");

    let options = ArchiveOptions {
        path_mapper: PathMapper::Flat,
        ..ArchiveOptions::default()
    };
    let result = archive_experiment(
        &fx.session.archive_context(),
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &options,
    )
    .unwrap();

    let url = result.archive.url.unwrap();
    let entries = members(&fx.vault.object(&url).unwrap());
    assert_eq!(entries[1], ("data.bin".to_string(), b"local".to_vec()));
    assert_eq!(entries[2], ("101-data.bin".to_string(), b"from afar".to_vec()));
    assert_eq!(fx.remote.count(Op::Get), 1);
}

#[test]
fn unreadable_datafiles_are_counted_not_fatal() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    let missing = tardis_types::Datafile::new(102, 10, "gone", &format!("{REMOTE_BASE}gone"));
    fx.catalog().save_datafile(&missing).unwrap();

    let result = archive_experiment(
        &fx.session.archive_context(),
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions::default(),
    )
    .unwrap();
    assert_eq!(result.archive.nos_files, 2);
    assert_eq!(result.archive.nos_errors, 1);
    assert!(result.members.iter().all(|m| m.datafile_id != 102));
}

#[test]
fn checksum_option_skips_corrupted_files() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    fx.session.store.write("1/a.txt", b"ALPHA").unwrap();
    let ctx = fx.session.archive_context();

    let lenient = archive_experiment(
        &ctx,
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions::default(),
    )
    .unwrap();
    assert_eq!(lenient.archive.nos_errors, 0);

    let strict = archive_experiment(
        &ctx,
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions {
            checksums: true,
            ..ArchiveOptions::default()
        },
    )
    .unwrap();
    assert_eq!(strict.archive.nos_errors, 1);
    assert_eq!(strict.members.len(), 1);
    assert_eq!(strict.members[0].datafile_id, 101);
}

#[test]
fn oversized_archive_is_refused_unless_forced() {
    let fx = Fixture::new();
    fx.add_experiment(1, &[]);
    fx.add_dataset(10, &[1]);
    fx.add_verified(100, 10, "big", &noise(8 * 1024));
    let ctx = fx.session.archive_context();
    let options = ArchiveOptions {
        max_size: Some(1024),
        ..ArchiveOptions::default()
    };

    let err = archive_experiment(&ctx, 1, ArchiveTarget::Location(fx.dest("vault")), &options)
        .unwrap_err();
    assert!(matches!(err, TardisError::Archiving(_)));
    assert_eq!(fx.vault.count(Op::Put), 0);
    assert!(fx.catalog().archives_for_experiment(1).unwrap().is_empty());

    let forced = ArchiveOptions {
        force: true,
        ..options
    };
    let result = archive_experiment(&ctx, 1, ArchiveTarget::Location(fx.dest("vault")), &forced).unwrap();
    assert!(result.archive.size > 1024);
    assert!(fx.vault.object(result.archive.url.as_deref().unwrap()).is_some());
}

#[test]
fn undersized_archive_is_refused() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    let err = archive_experiment(
        &fx.session.archive_context(),
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions {
            min_size: Some(1 << 30),
            ..ArchiveOptions::default()
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("below minimum"));
}

#[test]
fn failed_upload_verification_leaves_nothing_behind() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    fx.vault.corrupt_puts(true);

    let err = archive_experiment(
        &fx.session.archive_context(),
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TardisError::ChecksumMismatch { .. }));
    assert!(fx.vault.urls().is_empty());
    assert!(fx.catalog().archives_for_experiment(1).unwrap().is_empty());
}

#[test]
fn directory_target_writes_file_url() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    let dir = fx.tmp.path().join("out");
    std::fs::create_dir_all(&dir).unwrap();

    let result = archive_experiment(
        &fx.session.archive_context(),
        1,
        ArchiveTarget::Directory(&dir),
        &ArchiveOptions::default(),
    )
    .unwrap();

    let url = result.archive.url.unwrap();
    let path = url.strip_prefix("file://").unwrap();
    let bytes = std::fs::read(path).unwrap();
    assert_eq!(bytes.len() as u64, result.archive.size);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
    assert!(fx.vault.calls().is_empty());
}

#[test]
fn existing_objects_are_never_overwritten() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    let now = chrono::Utc::now();
    let taken: Vec<String> = (0..5)
        .map(|s| format!("{ARCHIVE_BASE}{}", archive_name(1, now + chrono::Duration::seconds(s))))
        .collect();
    for url in &taken {
        fx.vault.insert(url, b"earlier archive");
    }

    let result = archive_experiment(
        &fx.session.archive_context(),
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions::default(),
    )
    .unwrap();
    let url = result.archive.url.unwrap();
    assert!(!taken.contains(&url), "{url}");
    assert!(url.ends_with("-2.tar.gz"), "{url}");
    for url in &taken {
        assert_eq!(fx.vault.object(url).unwrap(), b"earlier archive");
    }
}

#[test]
fn repeated_directory_archives_get_separate_files() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    let dir = fx.tmp.path().join("out");
    std::fs::create_dir_all(&dir).unwrap();
    let ctx = fx.session.archive_context();

    let first = archive_experiment(&ctx, 1, ArchiveTarget::Directory(&dir), &ArchiveOptions::default())
        .unwrap();
    let second = archive_experiment(&ctx, 1, ArchiveTarget::Directory(&dir), &ArchiveOptions::default())
        .unwrap();
    assert_ne!(first.archive.url, second.archive.url);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
}

#[test]
fn send_offline_not_supported_is_not_an_error() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    archive_experiment(
        &fx.session.archive_context(),
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions {
            send_offline: true,
            ..ArchiveOptions::default()
        },
    )
    .unwrap();
    assert_eq!(fx.vault.count(Op::SendOffline), 1);
    assert!(fx.vault.offline().is_empty());
}

#[test]
fn removing_archived_data_repoints_records() {
    let fx = Fixture::new();
    experiment_with_two_files(&fx);
    let ctx = fx.session.archive_context();
    let changed_before = last_experiment_change(fx.catalog(), 1).unwrap();

    let result = archive_experiment(
        &ctx,
        1,
        ArchiveTarget::Location(fx.dest("vault")),
        &ArchiveOptions::default(),
    )
    .unwrap();
    let stats = remove_archived_data(&ctx, &result).unwrap();
    assert_eq!(stats.removed, 2);
    assert_eq!(stats.bytes, 9);

    let url = result.archive.url.unwrap();
    let df = fx.catalog().datafile(100).unwrap();
    assert_eq!(df.url, format!("{url}#10/a.txt"));
    assert_eq!(df.protocol, ARCHIVE_PROTOCOL);
    assert!(!df.is_local());
    assert!(!fx.session.store.exists("1/a.txt"));
    assert_eq!(last_experiment_change(fx.catalog(), 1).unwrap(), changed_before);
}
