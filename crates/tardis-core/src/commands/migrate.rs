use tardis_types::{Result, TardisError};

use crate::catalog::Catalog;
use crate::migrate::{MigrationOutcome, TransferMode, check_preconditions, migrate_datafile_by_id};
use crate::session::Session;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrateStats {
    pub migrated: usize,
    pub failed: usize,
    /// Candidates passed over without an attempt.
    pub skipped: usize,
    pub bytes: u64,
    /// Bytes whose local copy was actually deleted.
    pub freed: u64,
}

impl MigrateStats {
    pub(crate) fn record(&mut self, outcome: &MigrationOutcome) {
        self.migrated += 1;
        self.bytes += outcome.bytes;
        if outcome.local_removed {
            self.freed += outcome.bytes;
        }
    }
}

pub enum MigrateEvent {
    WouldMigrate { datafile_id: u64, url: String },
    Migrated(MigrationOutcome),
    Failed { datafile_id: u64, error: TardisError },
}

/// Check preconditions only; no transfer happens.
pub(crate) fn dry_run_one(session: &Session, datafile_id: u64, dest_name: Option<&str>) -> MigrateEvent {
    let result = session
        .destinations
        .select(dest_name)
        .and_then(|dest| check_preconditions(&session.catalog.datafile(datafile_id)?, dest));
    match result {
        Ok(url) => MigrateEvent::WouldMigrate { datafile_id, url },
        Err(error) => MigrateEvent::Failed { datafile_id, error },
    }
}

/// Migrate (or mirror) datafiles by id. Per-datafile failures are reported
/// as events and counted; an unknown destination fails the whole run.
pub fn run(
    session: &Session,
    ids: &[u64],
    dest_name: Option<&str>,
    mode: TransferMode,
    dry_run: bool,
) -> Result<(MigrateStats, Vec<MigrateEvent>)> {
    let dest = session.destinations.select(dest_name)?;
    let ctx = session.migration_context();
    let mut stats = MigrateStats::default();
    let mut events = Vec::with_capacity(ids.len());

    for &datafile_id in ids {
        if dry_run {
            let event = dry_run_one(session, datafile_id, Some(dest.name()));
            if matches!(event, MigrateEvent::Failed { .. }) {
                stats.failed += 1;
            }
            events.push(event);
            continue;
        }
        match migrate_datafile_by_id(&ctx, datafile_id, dest, mode) {
            Ok(outcome) => {
                stats.record(&outcome);
                events.push(MigrateEvent::Migrated(outcome));
            }
            Err(error) => {
                stats.failed += 1;
                events.push(MigrateEvent::Failed { datafile_id, error });
            }
        }
    }
    Ok((stats, events))
}
