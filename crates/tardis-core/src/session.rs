use tardis_types::Result;
use tracing::debug;

use crate::archive::ArchiveContext;
use crate::catalog::JsonCatalog;
use crate::config::TardisConfig;
use crate::destination::Destinations;
use crate::export::JsonManifestExporter;
use crate::lock::DatafileLocks;
use crate::migrate::MigrationContext;
use crate::store::FileStore;

/// Everything a batch command needs, built once from the loaded config.
pub struct Session {
    pub config: TardisConfig,
    pub catalog: JsonCatalog,
    pub store: FileStore,
    pub destinations: Destinations,
    pub locks: DatafileLocks,
    pub exporter: JsonManifestExporter,
}

impl Session {
    /// Open the catalog and build every configured destination.
    pub fn open(config: TardisConfig) -> Result<Self> {
        let catalog = JsonCatalog::open(&config.catalog_path)?;
        let destinations = Destinations::from_config(&config)?;
        debug!(
            catalog = %config.catalog_path.display(),
            store = %config.file_store_path.display(),
            "session opened"
        );
        Ok(Self::from_parts(config, catalog, destinations))
    }

    /// Assemble a session from pre-built parts.
    pub fn from_parts(config: TardisConfig, catalog: JsonCatalog, destinations: Destinations) -> Self {
        let store = FileStore::new(config.file_store_path.clone());
        Self {
            config,
            catalog,
            store,
            destinations,
            locks: DatafileLocks::new(),
            exporter: JsonManifestExporter,
        }
    }

    pub fn migration_context(&self) -> MigrationContext<'_> {
        MigrationContext {
            catalog: &self.catalog,
            store: &self.store,
            locks: &self.locks,
        }
    }

    pub fn archive_context(&self) -> ArchiveContext<'_> {
        ArchiveContext {
            catalog: &self.catalog,
            store: &self.store,
            destinations: &self.destinations,
            exporter: &self.exporter,
        }
    }
}
