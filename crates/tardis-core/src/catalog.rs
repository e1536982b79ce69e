use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tardis_types::{Archive, Datafile, Dataset, Experiment, Result, TardisError};
use tracing::debug;

/// Record store for experiments, datasets, datafiles and archive provenance.
/// All listings are in id order.
pub trait Catalog: Send + Sync {
    fn experiment(&self, id: u64) -> Result<Experiment>;
    fn experiments(&self) -> Result<Vec<Experiment>>;
    fn save_experiment(&self, experiment: &Experiment) -> Result<()>;

    fn dataset(&self, id: u64) -> Result<Dataset>;
    fn datasets_for_experiment(&self, experiment_id: u64) -> Result<Vec<Dataset>>;
    fn save_dataset(&self, dataset: &Dataset) -> Result<()>;

    fn datafile(&self, id: u64) -> Result<Datafile>;
    fn datafiles(&self) -> Result<Vec<Datafile>>;
    fn datafiles_for_dataset(&self, dataset_id: u64) -> Result<Vec<Datafile>>;
    fn save_datafile(&self, datafile: &Datafile) -> Result<()>;

    /// Datafiles of every dataset in the experiment, each listed once.
    fn datafiles_for_experiment(&self, experiment_id: u64) -> Result<Vec<Datafile>> {
        let mut out = Vec::new();
        for dataset in self.datasets_for_experiment(experiment_id)? {
            out.extend(self.datafiles_for_dataset(dataset.id)?);
        }
        out.sort_by_key(|df| df.id);
        out.dedup_by_key(|df| df.id);
        Ok(out)
    }

    /// Archives of one experiment, oldest first.
    fn archives_for_experiment(&self, experiment_id: u64) -> Result<Vec<Archive>>;
    /// Store a new archive record and return it with its assigned id.
    fn create_archive(&self, archive: Archive) -> Result<Archive>;
    fn delete_archive(&self, id: u64) -> Result<()>;

    /// Remove an experiment, plus datasets (and their datafiles) that belong
    /// to no other experiment. Archive records are kept as history.
    fn remove_experiment(&self, id: u64) -> Result<()>;
}

/// Most recent modification among an experiment, its datasets and their datafiles.
pub fn last_experiment_change(catalog: &dyn Catalog, experiment_id: u64) -> Result<DateTime<Utc>> {
    let experiment = catalog.experiment(experiment_id)?;
    let mut latest = experiment.updated;
    for dataset in catalog.datasets_for_experiment(experiment_id)? {
        latest = latest.max(dataset.updated);
        for datafile in catalog.datafiles_for_dataset(dataset.id)? {
            latest = latest.max(datafile.modified);
        }
    }
    Ok(latest)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    experiments: BTreeMap<u64, Experiment>,
    #[serde(default)]
    datasets: BTreeMap<u64, Dataset>,
    #[serde(default)]
    datafiles: BTreeMap<u64, Datafile>,
    #[serde(default)]
    archives: BTreeMap<u64, Archive>,
    #[serde(default)]
    next_archive_id: u64,
}

/// [`Catalog`] over a single JSON document, rewritten atomically after each
/// mutation. Opened without a path it lives purely in memory.
pub struct JsonCatalog {
    path: Option<PathBuf>,
    doc: Mutex<CatalogDocument>,
}

impl JsonCatalog {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: Mutex::new(CatalogDocument::default()),
        }
    }

    /// Open the catalog at `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        let doc = match std::fs::read(path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "catalog missing, starting empty");
                CatalogDocument::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            doc: Mutex::new(doc),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogDocument>> {
        self.doc
            .lock()
            .map_err(|_| TardisError::Io(std::io::Error::other("catalog lock poisoned")))
    }

    /// Apply a mutation and persist the result.
    fn update<T>(&self, f: impl FnOnce(&mut CatalogDocument) -> Result<T>) -> Result<T> {
        let mut doc = self.lock()?;
        let out = f(&mut doc)?;
        if let Some(ref path) = self.path {
            persist(path, &doc)?;
        }
        Ok(out)
    }
}

fn persist(path: &Path, doc: &CatalogDocument) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, doc)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn not_found(kind: &str, id: u64) -> TardisError {
    TardisError::NotFound(format!("{kind} {id}"))
}

impl Catalog for JsonCatalog {
    fn experiment(&self, id: u64) -> Result<Experiment> {
        self.lock()?
            .experiments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("experiment", id))
    }

    fn experiments(&self) -> Result<Vec<Experiment>> {
        Ok(self.lock()?.experiments.values().cloned().collect())
    }

    fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        self.update(|doc| {
            doc.experiments.insert(experiment.id, experiment.clone());
            Ok(())
        })
    }

    fn dataset(&self, id: u64) -> Result<Dataset> {
        self.lock()?
            .datasets
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("dataset", id))
    }

    fn datasets_for_experiment(&self, experiment_id: u64) -> Result<Vec<Dataset>> {
        Ok(self
            .lock()?
            .datasets
            .values()
            .filter(|ds| ds.experiments.contains(&experiment_id))
            .cloned()
            .collect())
    }

    fn save_dataset(&self, dataset: &Dataset) -> Result<()> {
        self.update(|doc| {
            doc.datasets.insert(dataset.id, dataset.clone());
            Ok(())
        })
    }

    fn datafile(&self, id: u64) -> Result<Datafile> {
        self.lock()?
            .datafiles
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("datafile", id))
    }

    fn datafiles(&self) -> Result<Vec<Datafile>> {
        Ok(self.lock()?.datafiles.values().cloned().collect())
    }

    fn datafiles_for_dataset(&self, dataset_id: u64) -> Result<Vec<Datafile>> {
        Ok(self
            .lock()?
            .datafiles
            .values()
            .filter(|df| df.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    fn save_datafile(&self, datafile: &Datafile) -> Result<()> {
        self.update(|doc| {
            doc.datafiles.insert(datafile.id, datafile.clone());
            Ok(())
        })
    }

    fn archives_for_experiment(&self, experiment_id: u64) -> Result<Vec<Archive>> {
        let mut archives: Vec<Archive> = self
            .lock()?
            .archives
            .values()
            .filter(|a| a.experiment_id == experiment_id)
            .cloned()
            .collect();
        archives.sort_by_key(|a| (a.created, a.id));
        Ok(archives)
    }

    fn create_archive(&self, mut archive: Archive) -> Result<Archive> {
        self.update(|doc| {
            doc.next_archive_id += 1;
            archive.id = doc.next_archive_id;
            doc.archives.insert(archive.id, archive.clone());
            Ok(archive)
        })
    }

    fn delete_archive(&self, id: u64) -> Result<()> {
        self.update(|doc| {
            doc.archives
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| not_found("archive", id))
        })
    }

    fn remove_experiment(&self, id: u64) -> Result<()> {
        self.update(|doc| {
            doc.experiments
                .remove(&id)
                .ok_or_else(|| not_found("experiment", id))?;
            let mut orphaned = Vec::new();
            for dataset in doc.datasets.values_mut() {
                if dataset.experiments.contains(&id) {
                    dataset.experiments.retain(|e| *e != id);
                    if dataset.experiments.is_empty() {
                        orphaned.push(dataset.id);
                    }
                }
            }
            for dataset_id in &orphaned {
                doc.datasets.remove(dataset_id);
            }
            doc.datafiles.retain(|_, df| !orphaned.contains(&df.dataset_id));
            Ok(())
        })
    }
}
