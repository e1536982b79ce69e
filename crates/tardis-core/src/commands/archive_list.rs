use tardis_types::{Archive, Result};

use super::util::select_experiments;
use crate::catalog::Catalog;
use crate::session::Session;

pub struct ArchiveListing {
    pub experiment_id: u64,
    pub archives: Vec<Archive>,
}

/// Archive records per selected experiment, oldest first.
pub fn run(session: &Session, ids: &[u64], all: bool) -> Result<Vec<ArchiveListing>> {
    select_experiments(&session.catalog, ids, all)?
        .into_iter()
        .map(|experiment_id| {
            Ok(ArchiveListing {
                experiment_id,
                archives: session.catalog.archives_for_experiment(experiment_id)?,
            })
        })
        .collect()
}
