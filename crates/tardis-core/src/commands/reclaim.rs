use chrono::Utc;
use tardis_types::Result;
use tracing::{debug, info, warn};

use super::migrate::{MigrateEvent, MigrateStats, dry_run_one};
use crate::migrate::{TransferMode, check_preconditions, migrate_datafile_by_id};
use crate::scorer::{ScoreScope, score_scope};
use crate::session::Session;

/// Move local datafiles to a destination in score order until at least
/// `amount` bytes of local storage are freed. Candidates the destination
/// refuses by policy are skipped; failures are counted and the run moves on
/// to the next candidate.
pub fn run(
    session: &Session,
    amount: u64,
    dest_name: Option<&str>,
    dry_run: bool,
) -> Result<(MigrateStats, Vec<MigrateEvent>)> {
    let dest = session.destinations.select(dest_name)?;
    let ctx = session.migration_context();
    let candidates = score_scope(&session.catalog, &session.config.scoring, ScoreScope::All, Utc::now())?;

    let mut stats = MigrateStats::default();
    let mut events = Vec::new();
    for candidate in candidates {
        if stats.freed >= amount {
            break;
        }
        let datafile_id = candidate.datafile.id;
        if let Err(e) = check_preconditions(&candidate.datafile, dest) {
            debug!(datafile_id, error = %e, "reclaim: not a candidate");
            stats.skipped += 1;
            continue;
        }
        if dry_run {
            let event = dry_run_one(session, datafile_id, Some(dest.name()));
            match event {
                MigrateEvent::WouldMigrate { .. } => {
                    stats.freed += candidate.datafile.size.unwrap_or(0);
                }
                _ => stats.failed += 1,
            }
            events.push(event);
            continue;
        }
        match migrate_datafile_by_id(&ctx, datafile_id, dest, TransferMode::Move) {
            Ok(outcome) => {
                stats.record(&outcome);
                events.push(MigrateEvent::Migrated(outcome));
            }
            Err(error) => {
                warn!(datafile_id, error = %error, "reclaim: migration failed");
                stats.failed += 1;
                events.push(MigrateEvent::Failed { datafile_id, error });
            }
        }
    }

    if stats.freed < amount {
        warn!(requested = amount, freed = stats.freed, "reclaim ran out of candidates");
    } else {
        info!(requested = amount, freed = stats.freed, "reclaim complete");
    }
    Ok((stats, events))
}
