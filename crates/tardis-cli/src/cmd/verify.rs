use tardis_core::commands::verify::{self, VerifyEvent};
use tardis_core::session::Session;

use crate::format::format_bytes;

pub(crate) fn run_verify(session: &Session, ids: &[u64]) -> Result<bool, Box<dyn std::error::Error>> {
    let (stats, events) = verify::run(session, ids)?;
    for event in &events {
        match event {
            VerifyEvent::Verified {
                datafile_id,
                checksums,
            } => println!(
                "verified datafile {datafile_id} ({}, md5 {})",
                format_bytes(checksums.length),
                checksums.md5sum
            ),
            VerifyEvent::Failed { datafile_id, error } => {
                eprintln!("Error: datafile {datafile_id}: {error}");
            }
        }
    }
    println!("Verified {} datafiles, {} failed", stats.verified, stats.failed);
    Ok(stats.failed > 0)
}
