use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tardis_transfer::testutil::MemoryProvider;
use tardis_types::{Archive, Datafile, Dataset, Experiment, Result, TardisError};
use tempfile::TempDir;

use crate::catalog::{Catalog, JsonCatalog};
use crate::checksum;
use crate::config::{ArchiveConfig, ScoringConfig, TardisConfig};
use crate::destination::{Destination, Destinations};
use crate::session::Session;

pub const REMOTE_BASE: &str = "http://remote.test/data/";
pub const ARCHIVE_BASE: &str = "http://vault.test/archives/";

pub fn test_config(root: &Path) -> TardisConfig {
    TardisConfig {
        file_store_path: root.join("store"),
        catalog_path: root.join("catalog.json"),
        default_destination: Some("remote".into()),
        destinations: Vec::new(),
        scoring: ScoringConfig::default(),
        archive: ArchiveConfig {
            scratch_dir: Some(root.join("scratch")),
            ..ArchiveConfig::default()
        },
    }
}

/// An in-memory session with two memory-backed destinations: `remote` for
/// datafiles and `vault` for archives.
pub struct Fixture {
    pub tmp: TempDir,
    pub session: Session,
    pub remote: MemoryProvider,
    pub vault: MemoryProvider,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(|d| d, |d| d)
    }

    /// Build with a chance to adjust each destination.
    pub fn with(
        remote_fn: impl FnOnce(Destination) -> Destination,
        vault_fn: impl FnOnce(Destination) -> Destination,
    ) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let remote = MemoryProvider::new("remote", REMOTE_BASE);
        let vault = MemoryProvider::new("vault", ARCHIVE_BASE);
        let destinations = Destinations::new(
            vec![
                remote_fn(Destination::new("remote", Box::new(remote.clone()))),
                vault_fn(Destination::new("vault", Box::new(vault.clone()))),
            ],
            Some("remote"),
        );
        let session = Session::from_parts(test_config(tmp.path()), JsonCatalog::in_memory(), destinations);
        std::fs::create_dir_all(session.store.root()).unwrap();
        Self {
            tmp,
            session,
            remote,
            vault,
        }
    }

    pub fn catalog(&self) -> &JsonCatalog {
        &self.session.catalog
    }

    pub fn dest(&self, name: &str) -> &Destination {
        self.session.destinations.get(name).unwrap()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.session.store.resolve(rel).unwrap()
    }

    pub fn add_experiment(&self, id: u64, owners: &[&str]) -> Experiment {
        let experiment = Experiment::new(id, &format!("experiment {id}"), owners);
        self.catalog().save_experiment(&experiment).unwrap();
        experiment
    }

    pub fn add_dataset(&self, id: u64, experiments: &[u64]) -> Dataset {
        let dataset = Dataset::new(id, &format!("dataset {id}"), experiments);
        self.catalog().save_dataset(&dataset).unwrap();
        dataset
    }

    /// Write `content` into the store at `rel` and record an unverified
    /// datafile for it.
    pub fn add_datafile(&self, id: u64, dataset_id: u64, rel: &str, content: &[u8]) -> Datafile {
        self.session.store.write(rel, content).unwrap();
        let filename = rel.rsplit('/').next().unwrap_or(rel);
        let mut datafile = Datafile::new(id, dataset_id, filename, rel);
        datafile.size = Some(content.len() as u64);
        self.catalog().save_datafile(&datafile).unwrap();
        datafile
    }

    /// Like [`Fixture::add_datafile`] but with checksums recorded and verified.
    pub fn add_verified(&self, id: u64, dataset_id: u64, rel: &str, content: &[u8]) -> Datafile {
        let mut datafile = self.add_datafile(id, dataset_id, rel, content);
        let sums = checksum::compute(content).unwrap();
        datafile.md5sum = Some(sums.md5sum);
        datafile.sha512sum = Some(sums.sha512sum);
        datafile.verified = true;
        self.catalog().save_datafile(&datafile).unwrap();
        datafile
    }
}

/// A catalog whose datafile saves can be made to fail; everything else goes
/// to the wrapped catalog.
pub struct FlakyCatalog<'a> {
    inner: &'a dyn Catalog,
    fail_saves: AtomicBool,
}

impl<'a> FlakyCatalog<'a> {
    pub fn new(inner: &'a dyn Catalog) -> Self {
        Self {
            inner,
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl Catalog for FlakyCatalog<'_> {
    fn experiment(&self, id: u64) -> Result<Experiment> {
        self.inner.experiment(id)
    }
    fn experiments(&self) -> Result<Vec<Experiment>> {
        self.inner.experiments()
    }
    fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        self.inner.save_experiment(experiment)
    }
    fn dataset(&self, id: u64) -> Result<Dataset> {
        self.inner.dataset(id)
    }
    fn datasets_for_experiment(&self, experiment_id: u64) -> Result<Vec<Dataset>> {
        self.inner.datasets_for_experiment(experiment_id)
    }
    fn save_dataset(&self, dataset: &Dataset) -> Result<()> {
        self.inner.save_dataset(dataset)
    }
    fn datafile(&self, id: u64) -> Result<Datafile> {
        self.inner.datafile(id)
    }
    fn datafiles(&self) -> Result<Vec<Datafile>> {
        self.inner.datafiles()
    }
    fn datafiles_for_dataset(&self, dataset_id: u64) -> Result<Vec<Datafile>> {
        self.inner.datafiles_for_dataset(dataset_id)
    }
    fn save_datafile(&self, datafile: &Datafile) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(TardisError::Io(std::io::Error::other("catalog is read-only")));
        }
        self.inner.save_datafile(datafile)
    }
    fn archives_for_experiment(&self, experiment_id: u64) -> Result<Vec<Archive>> {
        self.inner.archives_for_experiment(experiment_id)
    }
    fn create_archive(&self, archive: Archive) -> Result<Archive> {
        self.inner.create_archive(archive)
    }
    fn delete_archive(&self, id: u64) -> Result<()> {
        self.inner.delete_archive(id)
    }
    fn remove_experiment(&self, id: u64) -> Result<()> {
        self.inner.remove_experiment(id)
    }
}
