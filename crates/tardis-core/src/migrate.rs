use tardis_types::{Datafile, Result, TardisError};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::destination::Destination;
use crate::lock::DatafileLocks;
use crate::store::FileStore;
use crate::verify::{ExpectedContent, Verification, check_file_transferred};

/// What happens to the record and the local copy after a verified push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Repoint the record, then delete the local copy.
    Move,
    /// Repoint the record, keep the local copy.
    KeepLocal,
    /// Push and verify only; record and local copy are untouched.
    Mirror,
}

/// Shared state a migration needs.
#[derive(Clone, Copy)]
pub struct MigrationContext<'a> {
    pub catalog: &'a dyn Catalog,
    pub store: &'a FileStore,
    pub locks: &'a DatafileLocks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub datafile_id: u64,
    pub url: String,
    pub bytes: u64,
    pub verification: Verification,
    pub local_removed: bool,
}

/// Policy checks that run before any I/O. Returns the target URL.
pub fn check_preconditions(datafile: &Datafile, dest: &Destination) -> Result<String> {
    if !datafile.is_local() {
        return Err(TardisError::Migration(format!(
            "cannot migrate a non-local datafile ({})",
            datafile.url
        )));
    }
    if !datafile.verified && !dest.trust_length() {
        return Err(TardisError::Migration(format!(
            "only verified datafiles can be migrated to the {} destination",
            dest.name()
        )));
    }
    let target = dest.provider().generate_url(datafile)?;
    if target == datafile.url {
        return Err(TardisError::Migration(format!(
            "cannot migrate to current location ({target})"
        )));
    }
    Ok(target)
}

/// Remove a partially written or unverified remote object. A failed removal
/// is attached to the triggering error, never substituted for it.
pub(crate) fn discard_remote(dest: &Destination, url: &str, cause: TardisError) -> TardisError {
    match dest.provider().remove_file(url) {
        Ok(()) => cause,
        Err(cleanup) => {
            warn!(destination = %dest.name(), url, error = %cleanup, "cleanup of remote object failed");
            cause.with_cleanup_failure(cleanup)
        }
    }
}

/// Push one local datafile to `dest`, verify it, then (depending on `mode`)
/// repoint and save the record before deleting the local copy.
pub fn migrate_datafile(
    ctx: &MigrationContext<'_>,
    datafile: &mut Datafile,
    dest: &Destination,
    mode: TransferMode,
) -> Result<MigrationOutcome> {
    let target = check_preconditions(datafile, dest)?;
    let local_url = datafile.url.clone();
    let local_path = ctx.store.resolve(&local_url)?;
    let bytes = std::fs::metadata(&local_path)?.len();

    if let Err(e) = dest.provider().put_file(&local_path, &target) {
        return Err(discard_remote(dest, &target, e));
    }

    let verification = match check_file_transferred(&ExpectedContent::from(&*datafile), dest, &target)
    {
        Ok(v) => v,
        Err(e) => return Err(discard_remote(dest, &target, e)),
    };

    if mode == TransferMode::Mirror {
        info!(datafile_id = datafile.id, destination = %dest.name(), url = %target, "datafile mirrored");
        return Ok(MigrationOutcome {
            datafile_id: datafile.id,
            url: target,
            bytes,
            verification,
            local_removed: false,
        });
    }

    let previous = datafile.clone();
    datafile.repoint(&target, dest.datafile_protocol());
    if let Err(e) = ctx.catalog.save_datafile(datafile) {
        *datafile = previous;
        return Err(discard_remote(dest, &target, e));
    }

    let local_removed = match mode {
        TransferMode::Move => match ctx.store.remove(&local_url) {
            Ok(()) => true,
            Err(e) => {
                warn!(datafile_id = datafile.id, path = %local_path.display(), error = %e, "local copy not removed");
                false
            }
        },
        _ => false,
    };

    info!(
        datafile_id = datafile.id,
        destination = %dest.name(),
        url = %target,
        bytes,
        local_removed,
        "datafile migrated"
    );
    Ok(MigrationOutcome {
        datafile_id: datafile.id,
        url: target,
        bytes,
        verification,
        local_removed,
    })
}

/// [`migrate_datafile`] under the per-datafile lock, on a freshly loaded
/// record so a concurrent migration that finished first is observed.
pub fn migrate_datafile_by_id(
    ctx: &MigrationContext<'_>,
    datafile_id: u64,
    dest: &Destination,
    mode: TransferMode,
) -> Result<MigrationOutcome> {
    let _guard = ctx.locks.acquire(datafile_id);
    let mut datafile = ctx.catalog.datafile(datafile_id)?;
    migrate_datafile(ctx, &mut datafile, dest, mode)
}
