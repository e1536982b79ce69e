use tardis_core::commands::archive::{self, ArchiveEvent, ArchiveRunOptions, TargetSpec};
use tardis_core::session::Session;

use crate::cli::ArchiveArgs;
use crate::format::{format_bytes, parse_optional_size};

fn run_options(args: &ArchiveArgs) -> Result<ArchiveRunOptions, Box<dyn std::error::Error>> {
    let target = match (&args.location, &args.directory) {
        (Some(name), _) => Some(TargetSpec::Location(name.clone())),
        (None, Some(dir)) => Some(TargetSpec::Directory(dir.clone())),
        (None, None) => None,
    };
    Ok(ArchiveRunOptions {
        experiment_ids: args.ids.clone(),
        all: args.all,
        dry_run: args.dry_run,
        incremental: args.incremental,
        target,
        send_offline: args.send_offline,
        checksums: args.checksums,
        remove_data: args.remove_data,
        remove_all: args.remove_all,
        keep_only: args.keep_only,
        min_size: parse_optional_size(args.min_size.as_deref())?,
        max_size: parse_optional_size(args.max_size.as_deref())?,
        max_total_size: parse_optional_size(args.max_total_size.as_deref())?,
        force: args.force,
    })
}

pub(crate) fn run_archive(
    session: &Session,
    args: &ArchiveArgs,
) -> Result<bool, Box<dyn std::error::Error>> {
    let options = run_options(args)?;
    let (stats, events) = archive::run(session, &options)?;

    for event in &events {
        match event {
            ArchiveEvent::WouldArchive { experiment_id } => {
                println!("would archive experiment {experiment_id}");
            }
            ArchiveEvent::SkippedUnchanged { experiment_id } => {
                println!("skip (unchanged) experiment {experiment_id}");
            }
            ArchiveEvent::Archived {
                experiment_id,
                archive,
            } => {
                println!(
                    "archived experiment {experiment_id}: {} ({}, {} files, {} errors)",
                    archive.url.as_deref().unwrap_or("-"),
                    format_bytes(archive.size),
                    archive.nos_files,
                    archive.nos_errors,
                );
            }
            ArchiveEvent::DataRemoved {
                experiment_id,
                files,
                bytes,
                experiment_removed,
            } => {
                let suffix = if *experiment_removed {
                    " and the experiment record"
                } else {
                    ""
                };
                println!(
                    "removed {files} local files ({}) of experiment {experiment_id}{suffix}",
                    format_bytes(*bytes)
                );
            }
            ArchiveEvent::WouldPrune {
                experiment_id,
                archive_id,
            } => println!("would prune archive {archive_id} of experiment {experiment_id}"),
            ArchiveEvent::Pruned {
                experiment_id,
                archive_id,
            } => println!("pruned archive {archive_id} of experiment {experiment_id}"),
            ArchiveEvent::Failed {
                experiment_id,
                error,
            } => eprintln!("Error: experiment {experiment_id}: {error}"),
            ArchiveEvent::BudgetReached { total_bytes, limit } => println!(
                "size budget reached ({} of {}), not starting further archives",
                format_bytes(*total_bytes),
                format_bytes(*limit)
            ),
        }
    }

    let prefix = if options.dry_run { "Dry run: " } else { "" };
    println!(
        "{prefix}archived {}, skipped {}, pruned {}, errors {}, total {}",
        stats.archived,
        stats.skipped,
        stats.pruned,
        stats.errors,
        format_bytes(stats.total_bytes),
    );
    Ok(stats.errors > 0)
}
