use tardis_transfer::RemoteMetadata;
use tardis_types::{Archive, Datafile, Result, TardisError};
use tracing::debug;

use crate::checksum;
use crate::destination::Destination;

/// What a correctly transferred object must look like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedContent {
    pub md5sum: Option<String>,
    pub sha512sum: Option<String>,
    pub length: Option<u64>,
}

impl ExpectedContent {
    fn has_checksum(&self) -> bool {
        self.md5sum.is_some() || self.sha512sum.is_some()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

impl From<&Datafile> for ExpectedContent {
    fn from(df: &Datafile) -> Self {
        Self {
            md5sum: non_empty(&df.md5sum),
            sha512sum: non_empty(&df.sha512sum),
            length: df.size,
        }
    }
}

impl From<&Archive> for ExpectedContent {
    fn from(archive: &Archive) -> Self {
        Self {
            md5sum: Some(archive.md5sum.clone()),
            sha512sum: Some(archive.sha512sum.clone()),
            length: Some(archive.size),
        }
    }
}

/// Which strategy confirmed the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Metadata,
    Length,
    Content,
}

/// Outcome of one strategy that did not fail outright.
enum Probe {
    Matched,
    /// The remote side cannot answer this kind of question.
    Unavailable,
}

fn compare_hash(attribute: &'static str, local: &str, remote: &str) -> Result<Probe> {
    if local.eq_ignore_ascii_case(remote) {
        Ok(Probe::Matched)
    } else {
        Err(TardisError::ChecksumMismatch {
            attribute,
            local: local.to_string(),
            remote: remote.to_string(),
        })
    }
}

/// sha512 decides when both sides have it, otherwise md5.
fn compare_metadata(expected: &ExpectedContent, remote: &RemoteMetadata) -> Result<Probe> {
    if let (Some(local), Some(remote)) = (&expected.sha512sum, &remote.sha512sum) {
        return compare_hash("sha512sum", local, remote);
    }
    if let (Some(local), Some(remote)) = (&expected.md5sum, &remote.md5sum) {
        return compare_hash("md5sum", local, remote);
    }
    Ok(Probe::Unavailable)
}

fn probe_metadata(expected: &ExpectedContent, dest: &Destination, url: &str) -> Result<Probe> {
    match dest.provider().get_metadata(url) {
        Ok(remote) => compare_metadata(expected, &remote),
        Err(e) if e.is_unavailable() => {
            debug!(destination = %dest.name(), url, error = %e, "metadata unavailable, trying next strategy");
            Ok(Probe::Unavailable)
        }
        Err(e) => Err(e),
    }
}

fn probe_length(expected: &ExpectedContent, dest: &Destination, url: &str) -> Result<Probe> {
    let Some(local) = expected.length else {
        return Ok(Probe::Unavailable);
    };
    match dest.provider().get_length(url) {
        Ok(remote) if remote == local => Ok(Probe::Matched),
        Ok(remote) => Err(TardisError::ChecksumMismatch {
            attribute: "length",
            local: local.to_string(),
            remote: remote.to_string(),
        }),
        Err(e) if e.is_unavailable() => {
            debug!(destination = %dest.name(), url, error = %e, "length unavailable, trying next strategy");
            Ok(Probe::Unavailable)
        }
        Err(e) => Err(e),
    }
}

fn probe_content(expected: &ExpectedContent, dest: &Destination, url: &str) -> Result<Probe> {
    if !expected.has_checksum() {
        return Ok(Probe::Unavailable);
    }
    let remote = checksum::compute(dest.provider().get_file(url)?)?;
    checksum::compare_recorded(
        &remote,
        expected.md5sum.as_deref(),
        expected.sha512sum.as_deref(),
        None,
    )?;
    Ok(Probe::Matched)
}

/// Confirm that the object at `url` on `dest` matches `expected`.
///
/// Strategies run in order: remote metadata hashes, remote length (only on
/// trust-length destinations), then a full fetch and rehash. A strategy the
/// remote cannot answer falls through to the next; a strategy that compares
/// and disagrees fails the whole check.
pub fn check_file_transferred(
    expected: &ExpectedContent,
    dest: &Destination,
    url: &str,
) -> Result<Verification> {
    if let Probe::Matched = probe_metadata(expected, dest, url)? {
        return Ok(Verification::Metadata);
    }
    if dest.trust_length() {
        if let Probe::Matched = probe_length(expected, dest, url)? {
            return Ok(Verification::Length);
        }
    }
    if let Probe::Matched = probe_content(expected, dest, url)? {
        return Ok(Verification::Content);
    }
    Err(TardisError::Transfer(format!(
        "cannot verify {url} on the {} destination: no checksum or length to compare",
        dest.name()
    )))
}
