use chrono::{Duration, Utc};
use tardis_types::{Archive, Dataset, TardisError};

use crate::catalog::{Catalog, JsonCatalog, last_experiment_change};
use crate::testutil::Fixture;

fn archive_record(experiment_id: u64, age_days: i64) -> Archive {
    let created = Utc::now() - Duration::days(age_days);
    Archive {
        id: 0,
        experiment_id,
        experiment_owner: "alice".into(),
        experiment_title: "t".into(),
        created,
        experiment_changed: created,
        url: None,
        md5sum: String::new(),
        sha512sum: String::new(),
        size: 0,
        mimetype: String::new(),
        nos_files: 0,
        nos_errors: 0,
    }
}

#[test]
fn shared_dataset_files_are_listed_once() {
    let fx = Fixture::new();
    fx.add_experiment(1, &["alice"]);
    fx.add_dataset(10, &[1]);
    fx.add_dataset(11, &[1, 2]);
    fx.add_datafile(5, 11, "b/five", b"5");
    fx.add_datafile(3, 10, "a/three", b"3");

    let ids: Vec<u64> = fx
        .catalog()
        .datafiles_for_experiment(1)
        .unwrap()
        .iter()
        .map(|df| df.id)
        .collect();
    assert_eq!(ids, vec![3, 5]);
}

#[test]
fn last_change_covers_datafiles() {
    let fx = Fixture::new();
    let experiment = fx.add_experiment(1, &[]);
    fx.add_dataset(10, &[1]);
    let mut df = fx.add_datafile(3, 10, "x", b"x");
    df.modified = experiment.updated + Duration::hours(2);
    fx.catalog().save_datafile(&df).unwrap();

    assert_eq!(last_experiment_change(fx.catalog(), 1).unwrap(), df.modified);
}

#[test]
fn archive_ids_increase_and_list_oldest_first() {
    let catalog = JsonCatalog::in_memory();
    let newer = catalog.create_archive(archive_record(1, 1)).unwrap();
    let older = catalog.create_archive(archive_record(1, 5)).unwrap();
    catalog.create_archive(archive_record(2, 3)).unwrap();
    assert!(older.id > newer.id);

    let listed: Vec<u64> = catalog
        .archives_for_experiment(1)
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(listed, vec![older.id, newer.id]);

    catalog.delete_archive(older.id).unwrap();
    assert!(matches!(catalog.delete_archive(older.id), Err(TardisError::NotFound(_))));
}

#[test]
fn remove_experiment_keeps_shared_datasets_and_history() {
    let fx = Fixture::new();
    fx.add_experiment(1, &[]);
    fx.add_experiment(2, &[]);
    fx.add_dataset(10, &[1]);
    fx.add_dataset(11, &[1, 2]);
    fx.add_datafile(3, 10, "only", b"o");
    fx.add_datafile(4, 11, "shared", b"s");
    fx.catalog().create_archive(archive_record(1, 0)).unwrap();

    fx.catalog().remove_experiment(1).unwrap();

    assert!(fx.catalog().experiment(1).is_err());
    assert!(fx.catalog().dataset(10).is_err());
    assert!(fx.catalog().datafile(3).is_err());
    let shared: Dataset = fx.catalog().dataset(11).unwrap();
    assert_eq!(shared.experiments, vec![2]);
    assert!(fx.catalog().datafile(4).is_ok());
    assert_eq!(fx.catalog().archives_for_experiment(1).unwrap().len(), 1);
}

#[test]
fn json_catalog_persists_across_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nested").join("catalog.json");

    let catalog = JsonCatalog::open(&path).unwrap();
    assert!(catalog.experiments().unwrap().is_empty());
    catalog
        .save_experiment(&tardis_types::Experiment::new(4, "kept", &["bob"]))
        .unwrap();
    let archive = catalog.create_archive(archive_record(4, 0)).unwrap();
    drop(catalog);

    let reopened = JsonCatalog::open(&path).unwrap();
    assert_eq!(reopened.experiment(4).unwrap().title, "kept");
    assert_eq!(reopened.archives_for_experiment(4).unwrap()[0].id, archive.id);
    let next = reopened.create_archive(archive_record(4, 0)).unwrap();
    assert_eq!(next.id, archive.id + 1);
}
