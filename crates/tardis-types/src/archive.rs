use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ARCHIVE_MIMETYPE: &str = "application/x-tar-gz";

/// Provenance of one packaging-and-upload run of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    /// Assigned by the catalog on creation.
    #[serde(default)]
    pub id: u64,
    pub experiment_id: u64,
    pub experiment_owner: String,
    pub experiment_title: String,
    pub created: DateTime<Utc>,
    /// Last change of the experiment at packaging time; drives incremental mode.
    pub experiment_changed: DateTime<Utc>,
    /// Where the archive lives once uploaded or written.
    #[serde(default)]
    pub url: Option<String>,
    pub md5sum: String,
    pub sha512sum: String,
    pub size: u64,
    pub mimetype: String,
    pub nos_files: u64,
    pub nos_errors: u64,
}
