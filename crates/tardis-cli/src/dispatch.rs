use tardis_core::migrate::TransferMode;
use tardis_core::scorer::ScoreScope;
use tardis_core::session::Session;

use crate::cli::Commands;
use crate::cmd;

/// Run one subcommand. `Ok(true)` means the command finished but some items
/// failed.
pub(crate) fn dispatch_command(
    command: &Commands,
    session: &Session,
) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Commands::Archive(args) => cmd::archive::run_archive(session, args),
        Commands::Archivelist { ids, all } => {
            cmd::archivelist::run_archivelist(session, ids, *all).map(|()| false)
        }
        Commands::Migrate {
            ids,
            dest,
            no_remove,
            dry_run,
        } => {
            let mode = if *no_remove {
                TransferMode::KeepLocal
            } else {
                TransferMode::Move
            };
            cmd::migrate::run_migrate(session, ids, dest.as_deref(), mode, *dry_run)
        }
        Commands::Mirror { ids, dest, dry_run } => {
            cmd::migrate::run_migrate(session, ids, dest.as_deref(), TransferMode::Mirror, *dry_run)
        }
        Commands::Reclaim {
            amount,
            dest,
            dry_run,
        } => cmd::reclaim::run_reclaim(session, amount, dest.as_deref(), *dry_run),
        Commands::Score {
            experiment,
            dataset,
            limit,
        } => {
            let scope = match (experiment, dataset) {
                (Some(id), _) => ScoreScope::Experiment(*id),
                (None, Some(id)) => ScoreScope::Dataset(*id),
                (None, None) => ScoreScope::All,
            };
            cmd::score::run_score(session, scope, *limit).map(|()| false)
        }
        Commands::Destinations => cmd::destinations::run_destinations(session),
        Commands::Verify { ids } => cmd::verify::run_verify(session, ids),
        Commands::Config { .. } => Err("config does not take a session".into()),
    }
}
