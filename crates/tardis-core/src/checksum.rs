use std::io::Read;

use md5::{Digest, Md5};
use sha2::Sha512;
use tardis_types::{Datafile, Result, TardisError};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::store::FileStore;

const BUF_SIZE: usize = 64 * 1024;

/// Digests and length of a byte stream, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksums {
    pub md5sum: String,
    pub sha512sum: String,
    pub length: u64,
}

/// Hash a stream in fixed-size chunks.
pub fn compute(mut reader: impl Read) -> Result<Checksums> {
    let mut md5 = Md5::new();
    let mut sha512 = Sha512::new();
    let mut length = 0u64;
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        md5.update(&buf[..n]);
        sha512.update(&buf[..n]);
        length += n as u64;
    }
    Ok(Checksums {
        md5sum: hex::encode(md5.finalize()),
        sha512sum: hex::encode(sha512.finalize()),
        length,
    })
}

/// Compare freshly computed checksums against what a record claims.
/// Absent or empty recorded values are not compared.
pub fn compare_recorded(
    computed: &Checksums,
    md5sum: Option<&str>,
    sha512sum: Option<&str>,
    size: Option<u64>,
) -> Result<()> {
    let pairs = [
        ("sha512sum", sha512sum, computed.sha512sum.as_str()),
        ("md5sum", md5sum, computed.md5sum.as_str()),
    ];
    for (attribute, recorded, actual) in pairs {
        if let Some(recorded) = recorded.filter(|s| !s.is_empty()) {
            if !recorded.eq_ignore_ascii_case(actual) {
                return Err(TardisError::ChecksumMismatch {
                    attribute,
                    local: recorded.to_string(),
                    remote: actual.to_string(),
                });
            }
        }
    }
    if let Some(size) = size {
        if size != computed.length {
            return Err(TardisError::ChecksumMismatch {
                attribute: "length",
                local: size.to_string(),
                remote: computed.length.to_string(),
            });
        }
    }
    Ok(())
}

/// Recompute a local datafile's checksums and mark it verified.
///
/// Recorded checksums and size must agree with the file; missing ones are
/// filled in. On disagreement the datafile is saved as unverified and the
/// mismatch is returned.
pub fn verify_datafile(
    catalog: &dyn Catalog,
    store: &FileStore,
    datafile: &mut Datafile,
) -> Result<Checksums> {
    if !datafile.is_local() {
        return Err(TardisError::Migration(format!(
            "cannot verify non-local datafile {} at {}",
            datafile.id, datafile.url
        )));
    }
    let computed = compute(store.open(&datafile.url)?)?;

    if let Err(e) = compare_recorded(
        &computed,
        datafile.md5sum.as_deref(),
        datafile.sha512sum.as_deref(),
        datafile.size,
    ) {
        warn!(datafile_id = datafile.id, error = %e, "datafile failed verification");
        if datafile.verified {
            datafile.verified = false;
            catalog.save_datafile(datafile)?;
        }
        return Err(e);
    }

    if datafile.md5sum.as_deref().is_none_or(str::is_empty) {
        datafile.md5sum = Some(computed.md5sum.clone());
    }
    if datafile.sha512sum.as_deref().is_none_or(str::is_empty) {
        datafile.sha512sum = Some(computed.sha512sum.clone());
    }
    datafile.size.get_or_insert(computed.length);
    datafile.verified = true;
    catalog.save_datafile(datafile)?;
    info!(datafile_id = datafile.id, "datafile verified");
    Ok(computed)
}
