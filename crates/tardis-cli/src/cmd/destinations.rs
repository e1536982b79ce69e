use comfy_table::Cell;
use tardis_core::session::Session;

use crate::table::CliTableTheme;

/// Print every destination with a liveness probe. Unreachable ones make the
/// command fail.
pub(crate) fn run_destinations(session: &Session) -> Result<bool, Box<dyn std::error::Error>> {
    if session.config.destinations.is_empty() {
        println!("No destinations configured.");
        return Ok(false);
    }

    let theme = CliTableTheme::detect();
    let mut table =
        theme.new_data_table(&["Name", "Provider", "Base URL", "Trust length", "Default", "Alive"]);
    let default = session.config.default_destination.as_deref();
    let mut unreachable = 0usize;
    for config in &session.config.destinations {
        let dest = session.destinations.get(&config.name)?;
        let alive = dest.provider().alive();
        if !alive {
            unreachable += 1;
        }
        table.add_row(vec![
            Cell::new(&config.name),
            Cell::new(config.provider),
            Cell::new(dest.base_url()),
            Cell::new(if dest.trust_length() { "yes" } else { "no" }),
            Cell::new(if default == Some(config.name.as_str()) { "*" } else { "" }),
            Cell::new(if alive { "yes" } else { "no" }),
        ]);
    }
    println!("{table}");
    Ok(unreachable > 0)
}
