use comfy_table::Cell;
use tardis_core::commands::score;
use tardis_core::scorer::ScoreScope;
use tardis_core::session::Session;

use crate::format::format_bytes;
use crate::table::CliTableTheme;

pub(crate) fn run_score(
    session: &Session,
    scope: ScoreScope,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scored = score::run(session, scope, limit)?;
    if scored.is_empty() {
        println!("No local datafiles.");
        return Ok(());
    }

    let theme = CliTableTheme::detect();
    let mut table = theme.new_data_table(&["Datafile", "Score", "Size", "Verified", "Filename"]);
    for entry in &scored {
        let df = &entry.datafile;
        table.add_row(vec![
            Cell::new(df.id),
            Cell::new(format!("{:.3}", entry.score)),
            Cell::new(df.size.map(format_bytes).unwrap_or_else(|| "-".into())),
            Cell::new(if df.verified { "yes" } else { "no" }),
            Cell::new(&df.filename),
        ]);
    }
    println!("{table}");
    Ok(())
}
