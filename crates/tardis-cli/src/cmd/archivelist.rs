use comfy_table::Cell;
use tardis_core::commands::archive_list;
use tardis_core::session::Session;

use crate::format::{format_bytes, format_timestamp};
use crate::table::CliTableTheme;

pub(crate) fn run_archivelist(
    session: &Session,
    ids: &[u64],
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let listings = archive_list::run(session, ids, all)?;

    let theme = CliTableTheme::detect();
    let mut table = theme.new_data_table(&[
        "Experiment",
        "Archive",
        "Created",
        "Size",
        "Files",
        "Errors",
        "URL",
    ]);
    let mut rows = 0usize;
    for listing in &listings {
        for archive in &listing.archives {
            table.add_row(vec![
                Cell::new(listing.experiment_id),
                Cell::new(archive.id),
                Cell::new(format_timestamp(archive.created)),
                Cell::new(format_bytes(archive.size)),
                Cell::new(archive.nos_files),
                Cell::new(archive.nos_errors),
                Cell::new(archive.url.as_deref().unwrap_or("-")),
            ]);
            rows += 1;
        }
    }

    if rows == 0 {
        println!("No archives.");
    } else {
        println!("{table}");
    }
    Ok(())
}
