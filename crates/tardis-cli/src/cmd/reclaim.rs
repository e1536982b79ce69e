use tardis_core::commands::reclaim;
use tardis_core::migrate::TransferMode;
use tardis_core::session::Session;

use super::migrate::print_events;
use crate::format::{format_bytes, parse_size};

pub(crate) fn run_reclaim(
    session: &Session,
    amount: &str,
    dest: Option<&str>,
    dry_run: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let amount = parse_size(amount)?;
    let (stats, events) = reclaim::run(session, amount, dest, dry_run)?;
    print_events(&events, TransferMode::Move);

    let prefix = if dry_run { "Dry run: would free" } else { "Freed" };
    println!(
        "{prefix} {} of {} requested ({} datafiles migrated, {} skipped, {} failed)",
        format_bytes(stats.freed),
        format_bytes(amount),
        stats.migrated,
        stats.skipped,
        stats.failed,
    );
    Ok(stats.failed > 0)
}
