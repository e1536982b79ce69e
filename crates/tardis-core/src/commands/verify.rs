use tardis_types::{Result, TardisError};

use crate::catalog::Catalog;
use crate::checksum::{Checksums, verify_datafile};
use crate::session::Session;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyStats {
    pub verified: usize,
    pub failed: usize,
}

pub enum VerifyEvent {
    Verified { datafile_id: u64, checksums: Checksums },
    Failed { datafile_id: u64, error: TardisError },
}

/// Recompute local checksums for each datafile and mark it verified.
/// A failure on one datafile does not stop the others.
pub fn run(session: &Session, ids: &[u64]) -> Result<(VerifyStats, Vec<VerifyEvent>)> {
    let mut stats = VerifyStats::default();
    let mut events = Vec::with_capacity(ids.len());
    for &datafile_id in ids {
        let _guard = session.locks.acquire(datafile_id);
        let result = session
            .catalog
            .datafile(datafile_id)
            .and_then(|mut df| verify_datafile(&session.catalog, &session.store, &mut df));
        match result {
            Ok(checksums) => {
                stats.verified += 1;
                events.push(VerifyEvent::Verified {
                    datafile_id,
                    checksums,
                });
            }
            Err(error) => {
                stats.failed += 1;
                events.push(VerifyEvent::Failed { datafile_id, error });
            }
        }
    }
    Ok((stats, events))
}
