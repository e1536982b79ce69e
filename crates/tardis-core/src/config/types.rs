use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tardis_transfer::{ProviderKind, ProviderSettings};

use super::defaults::*;
use super::util::expand_tilde;

/// Process-wide settings, loaded once at start-up and passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TardisConfig {
    /// Root directory against which local datafile URLs resolve.
    pub file_store_path: PathBuf,
    /// JSON catalog of experiments, datasets, datafiles and archives.
    pub catalog_path: PathBuf,
    #[serde(default)]
    pub default_destination: Option<String>,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl TardisConfig {
    pub fn destination(&self, name: &str) -> Option<&DestinationConfig> {
        self.destinations.iter().find(|d| d.name == name)
    }

    pub(super) fn expand_paths(&mut self) {
        self.file_store_path = expand_tilde(&self.file_store_path.to_string_lossy());
        self.catalog_path = expand_tilde(&self.catalog_path.to_string_lossy());
        if let Some(ref dir) = self.archive.scratch_dir {
            self.archive.scratch_dir = Some(expand_tilde(&dir.to_string_lossy()));
        }
        if let Some(ref dir) = self.archive.default_directory {
            self.archive.default_directory = Some(expand_tilde(&dir.to_string_lossy()));
        }
        for dest in &mut self.destinations {
            dest.ssh_key = dest.ssh_key.take().map(|p| expand_tilde(&p.to_string_lossy()));
            dest.ssh_known_hosts = dest
                .ssh_known_hosts
                .take()
                .map(|p| expand_tilde(&p.to_string_lossy()));
        }
    }
}

/// One configured remote storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    pub name: String,
    pub provider: ProviderKind,
    pub base_url: String,
    /// Protocol tag written to datafiles migrated here.
    #[serde(default)]
    pub datafile_protocol: String,
    /// Accept a matching remote length as proof of a good transfer.
    #[serde(default)]
    pub trust_length: bool,
    #[serde(default)]
    pub metadata_supported: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
    #[serde(default)]
    pub ssh_known_hosts: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DestinationConfig {
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            metadata_supported: self.metadata_supported,
            user: self.user.clone(),
            password: self.password.clone(),
            ssh_key: self.ssh_key.clone(),
            ssh_known_hosts: self.ssh_known_hosts.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Weights for the migration scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Weight per user priority class, highest priority first.
    #[serde(default = "default_user_priority_weighting")]
    pub user_priority_weighting: Vec<f64>,
    /// Username to priority class index.
    #[serde(default)]
    pub user_priorities: BTreeMap<String, usize>,
    #[serde(default = "default_user_priority")]
    pub default_user_priority: usize,
    #[serde(default = "default_file_size_weighting")]
    pub file_size_weighting: f64,
    /// Files at or below this size get no size bonus.
    #[serde(default)]
    pub file_size_threshold: u64,
    #[serde(default)]
    pub file_age_weighting: f64,
    #[serde(default)]
    pub file_age_threshold: u64,
    #[serde(default = "default_unverified_weighting")]
    pub unverified_weighting: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            user_priority_weighting: default_user_priority_weighting(),
            user_priorities: BTreeMap::new(),
            default_user_priority: default_user_priority(),
            file_size_weighting: default_file_size_weighting(),
            file_size_threshold: 0,
            file_age_weighting: 0.0,
            file_age_threshold: 0,
            unverified_weighting: default_unverified_weighting(),
        }
    }
}

/// How datafiles are laid out inside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMapper {
    /// `<filename>` at the archive root.
    Flat,
    /// `<dataset id>/<filename>`.
    Dataset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    #[serde(default = "default_path_mapper")]
    pub path_mapper: PathMapper,
    /// Where archives are assembled before upload. Defaults to the system temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Destination used by `archive` when neither `--location` nor
    /// `--directory` is given.
    #[serde(default)]
    pub default_location: Option<String>,
    #[serde(default)]
    pub default_directory: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path_mapper: default_path_mapper(),
            scratch_dir: None,
            default_location: None,
            default_directory: None,
        }
    }
}
