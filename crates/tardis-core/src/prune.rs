use std::collections::HashSet;
use std::fmt;

use tardis_types::{Archive, Result, TardisError};
use tracing::{info, warn};

use crate::archive::remove_archive_object;
use crate::catalog::Catalog;
use crate::destination::Destinations;

/// What retention decided for one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneDecision {
    Keep,
    Prune,
}

impl fmt::Display for PruneDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneDecision::Keep => f.write_str("keep"),
            PruneDecision::Prune => f.write_str("prune"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PruneEntry {
    pub archive: Archive,
    pub decision: PruneDecision,
}

/// Keep the `keep_only` newest archives and prune the rest.
/// Output is oldest first, like the input.
pub fn plan_retention(mut archives: Vec<Archive>, keep_only: usize) -> Result<Vec<PruneEntry>> {
    if keep_only == 0 {
        return Err(TardisError::Config(
            "keepOnly must be at least 1".into(),
        ));
    }
    archives.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
    let cutoff = archives.len().saturating_sub(keep_only);
    Ok(archives
        .into_iter()
        .enumerate()
        .map(|(i, archive)| PruneEntry {
            archive,
            decision: if i < cutoff {
                PruneDecision::Prune
            } else {
                PruneDecision::Keep
            },
        })
        .collect())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneStats {
    pub kept: usize,
    pub pruned: usize,
    /// Stored objects that could not be deleted; their records are gone anyway.
    pub remote_failures: usize,
}

/// Apply retention to one experiment's archives. Stored objects are removed
/// first; a failed removal is logged and the record is still deleted.
pub fn prune_experiment_archives(
    catalog: &dyn Catalog,
    destinations: &Destinations,
    experiment_id: u64,
    keep_only: usize,
    dry_run: bool,
) -> Result<(PruneStats, Vec<PruneEntry>)> {
    let plan = plan_retention(catalog.archives_for_experiment(experiment_id)?, keep_only)?;
    let kept_urls: HashSet<&str> = plan
        .iter()
        .filter(|e| e.decision == PruneDecision::Keep)
        .filter_map(|e| e.archive.url.as_deref())
        .collect();
    let mut stats = PruneStats::default();

    for entry in &plan {
        if entry.decision == PruneDecision::Keep {
            stats.kept += 1;
            continue;
        }
        stats.pruned += 1;
        if dry_run {
            continue;
        }
        match entry.archive.url.as_deref() {
            Some(url) if kept_urls.contains(url) => {
                warn!(
                    archive_id = entry.archive.id,
                    url,
                    "archive object shared with a kept archive, not removed"
                );
            }
            Some(url) => {
                if let Err(e) = remove_archive_object(destinations, url) {
                    warn!(archive_id = entry.archive.id, url, error = %e, "could not remove archive object");
                    stats.remote_failures += 1;
                }
            }
            None => {}
        }
        catalog.delete_archive(entry.archive.id)?;
        info!(experiment_id, archive_id = entry.archive.id, "archive pruned");
    }
    Ok((stats, plan))
}
