use tardis_core::commands::migrate::{self, MigrateEvent, MigrateStats};
use tardis_core::migrate::TransferMode;
use tardis_core::session::Session;

use crate::format::format_bytes;

pub(crate) fn print_events(events: &[MigrateEvent], mode: TransferMode) {
    let verb = match mode {
        TransferMode::Mirror => "mirror",
        _ => "migrate",
    };
    for event in events {
        match event {
            MigrateEvent::WouldMigrate { datafile_id, url } => {
                println!("would {verb} datafile {datafile_id} -> {url}");
            }
            MigrateEvent::Migrated(outcome) => {
                println!(
                    "datafile {} -> {} ({}, verified by {:?}{})",
                    outcome.datafile_id,
                    outcome.url,
                    format_bytes(outcome.bytes),
                    outcome.verification,
                    if outcome.local_removed {
                        ", local copy removed"
                    } else {
                        ""
                    },
                );
            }
            MigrateEvent::Failed { datafile_id, error } => {
                eprintln!("Error: datafile {datafile_id}: {error}");
            }
        }
    }
}

pub(crate) fn print_summary(stats: &MigrateStats, mode: TransferMode, dry_run: bool) {
    let verb = match mode {
        TransferMode::Mirror => "Mirrored",
        _ => "Migrated",
    };
    if dry_run {
        println!("Dry run: {} failed precondition checks", stats.failed);
    } else {
        println!(
            "{verb} {} datafiles ({}), freed {}, {} failed",
            stats.migrated,
            format_bytes(stats.bytes),
            format_bytes(stats.freed),
            stats.failed,
        );
    }
}

pub(crate) fn run_migrate(
    session: &Session,
    ids: &[u64],
    dest: Option<&str>,
    mode: TransferMode,
    dry_run: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let (stats, events) = migrate::run(session, ids, dest, mode, dry_run)?;
    print_events(&events, mode);
    print_summary(&stats, mode, dry_run);
    Ok(stats.failed > 0)
}
