use std::path::PathBuf;

use tardis_types::{Archive, Result, TardisError};
use tracing::{info, warn};

use super::util::select_experiments;
use crate::archive::{
    ArchiveOptions, ArchiveResult, ArchiveTarget, archive_experiment, remove_archived_data,
};
use crate::catalog::{Catalog, last_experiment_change};
use crate::prune::{PruneDecision, plan_retention, prune_experiment_archives};
use crate::session::Session;

/// Where `archive` writes, as named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Location(String),
    Directory(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveRunOptions {
    pub experiment_ids: Vec<u64>,
    pub all: bool,
    pub dry_run: bool,
    pub incremental: bool,
    /// Falls back to the configured default location or directory.
    pub target: Option<TargetSpec>,
    pub send_offline: bool,
    pub checksums: bool,
    pub remove_data: bool,
    pub remove_all: bool,
    pub keep_only: Option<usize>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub max_total_size: Option<u64>,
    pub force: bool,
}

#[derive(Debug)]
pub enum ArchiveEvent {
    WouldArchive { experiment_id: u64 },
    SkippedUnchanged { experiment_id: u64 },
    Archived { experiment_id: u64, archive: Archive },
    DataRemoved { experiment_id: u64, files: u64, bytes: u64, experiment_removed: bool },
    WouldPrune { experiment_id: u64, archive_id: u64 },
    Pruned { experiment_id: u64, archive_id: u64 },
    Failed { experiment_id: u64, error: TardisError },
    BudgetReached { total_bytes: u64, limit: u64 },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveRunStats {
    pub archived: usize,
    pub skipped: usize,
    pub pruned: usize,
    pub errors: usize,
    pub total_bytes: u64,
    pub budget_exhausted: bool,
}

fn resolve_target(session: &Session, spec: Option<&TargetSpec>) -> Result<TargetSpec> {
    if let Some(spec) = spec {
        return Ok(spec.clone());
    }
    let archive = &session.config.archive;
    if let Some(ref name) = archive.default_location {
        return Ok(TargetSpec::Location(name.clone()));
    }
    if let Some(ref dir) = archive.default_directory {
        return Ok(TargetSpec::Directory(dir.clone()));
    }
    Err(TardisError::Config(
        "no archive target: pass --location or --directory, or set archive.default_location".into(),
    ))
}

/// True when the newest existing archive already covers the experiment's
/// last change.
fn unchanged_since_last_archive(catalog: &dyn Catalog, experiment_id: u64) -> Result<bool> {
    let archives = catalog.archives_for_experiment(experiment_id)?;
    let Some(latest) = archives.iter().max_by_key(|a| (a.created, a.id)) else {
        return Ok(false);
    };
    Ok(last_experiment_change(catalog, experiment_id)? <= latest.experiment_changed)
}

struct Run<'a> {
    session: &'a Session,
    options: &'a ArchiveRunOptions,
    archive_options: ArchiveOptions,
    stats: ArchiveRunStats,
    events: Vec<ArchiveEvent>,
}

impl Run<'_> {
    fn process(&mut self, experiment_id: u64, target: ArchiveTarget<'_>) -> Result<()> {
        let catalog = &self.session.catalog;
        catalog.experiment(experiment_id)?;

        let unchanged = self.options.incremental && unchanged_since_last_archive(catalog, experiment_id)?;
        let mut archived = None;
        if unchanged {
            info!(experiment_id, "experiment unchanged since last archive");
            self.stats.skipped += 1;
            self.events.push(ArchiveEvent::SkippedUnchanged { experiment_id });
        } else if self.options.dry_run {
            self.events.push(ArchiveEvent::WouldArchive { experiment_id });
        } else {
            let ctx = self.session.archive_context();
            let result = archive_experiment(&ctx, experiment_id, target, &self.archive_options)?;
            self.stats.archived += 1;
            self.stats.total_bytes += result.archive.size;
            self.events.push(ArchiveEvent::Archived {
                experiment_id,
                archive: result.archive.clone(),
            });
            archived = Some(result);
        }

        // Retention applies even when data removal is refused below.
        if let Some(keep_only) = self.options.keep_only {
            self.prune(experiment_id, keep_only, !unchanged)?;
        }
        if let Some(result) = archived {
            if self.options.remove_data || self.options.remove_all {
                self.remove_data(experiment_id, &result)?;
            }
        }
        Ok(())
    }

    fn remove_data(&mut self, experiment_id: u64, result: &ArchiveResult) -> Result<()> {
        if result.archive.nos_errors > 0 && !self.options.force {
            return Err(TardisError::Archiving(format!(
                "refusing to remove data of experiment {experiment_id}: {} datafiles were not archived (use --force)",
                result.archive.nos_errors
            )));
        }
        let ctx = self.session.archive_context();
        let removal = remove_archived_data(&ctx, result)?;
        if self.options.remove_all {
            self.session.catalog.remove_experiment(experiment_id)?;
        }
        self.events.push(ArchiveEvent::DataRemoved {
            experiment_id,
            files: removal.removed,
            bytes: removal.bytes,
            experiment_removed: self.options.remove_all,
        });
        Ok(())
    }

    fn prune(&mut self, experiment_id: u64, keep_only: usize, pending: bool) -> Result<()> {
        if !self.options.dry_run {
            let (stats, plan) = prune_experiment_archives(
                &self.session.catalog,
                &self.session.destinations,
                experiment_id,
                keep_only,
                false,
            )?;
            self.stats.pruned += stats.pruned;
            self.events.extend(
                plan.into_iter()
                    .filter(|e| e.decision == PruneDecision::Prune)
                    .map(|e| ArchiveEvent::Pruned {
                        experiment_id,
                        archive_id: e.archive.id,
                    }),
            );
            return Ok(());
        }

        // A would-be archive takes one of the kept slots.
        let existing = self.session.catalog.archives_for_experiment(experiment_id)?;
        let doomed: Vec<u64> = if pending && keep_only == 1 {
            existing.iter().map(|a| a.id).collect()
        } else {
            let slots = if pending { keep_only - 1 } else { keep_only };
            plan_retention(existing, slots)?
                .into_iter()
                .filter(|e| e.decision == PruneDecision::Prune)
                .map(|e| e.archive.id)
                .collect()
        };
        self.stats.pruned += doomed.len();
        self.events.extend(
            doomed
                .into_iter()
                .map(|archive_id| ArchiveEvent::WouldPrune { experiment_id, archive_id }),
        );
        Ok(())
    }
}

/// Archive each selected experiment. Per-experiment failures are recorded
/// and the batch continues; once `max_total_size` bytes have been archived
/// no further archives are started. Dry runs touch neither the catalog nor
/// any destination.
pub fn run(session: &Session, options: &ArchiveRunOptions) -> Result<(ArchiveRunStats, Vec<ArchiveEvent>)> {
    if options.keep_only == Some(0) {
        return Err(TardisError::Config("keepOnly must be at least 1".into()));
    }
    let experiment_ids = select_experiments(&session.catalog, &options.experiment_ids, options.all)?;
    let spec = resolve_target(session, options.target.as_ref())?;
    let target = match spec {
        TargetSpec::Location(ref name) => ArchiveTarget::Location(session.destinations.get(name)?),
        TargetSpec::Directory(ref dir) => {
            if !options.dry_run {
                std::fs::create_dir_all(dir)?;
            }
            ArchiveTarget::Directory(dir.as_path())
        }
    };

    let archive_config = &session.config.archive;
    let mut run = Run {
        session,
        options,
        archive_options: ArchiveOptions {
            checksums: options.checksums,
            min_size: options.min_size,
            max_size: options.max_size,
            force: options.force,
            send_offline: options.send_offline,
            path_mapper: archive_config.path_mapper,
            scratch_dir: archive_config.scratch_dir.clone(),
        },
        stats: ArchiveRunStats::default(),
        events: Vec::new(),
    };

    for experiment_id in experiment_ids {
        if let Some(limit) = options.max_total_size {
            if run.stats.total_bytes >= limit {
                warn!(total_bytes = run.stats.total_bytes, limit, "archive size budget reached");
                run.stats.budget_exhausted = true;
                run.events.push(ArchiveEvent::BudgetReached {
                    total_bytes: run.stats.total_bytes,
                    limit,
                });
                break;
            }
        }
        if let Err(error) = run.process(experiment_id, target) {
            warn!(experiment_id, error = %error, "archiving failed");
            run.stats.errors += 1;
            run.events.push(ArchiveEvent::Failed { experiment_id, error });
        }
    }
    Ok((run.stats, run.events))
}
