pub mod http_provider;
pub mod http_util;
pub mod metadata;
pub mod registry;
pub mod scp_provider;
pub mod shell;
pub mod webdav_provider;

#[cfg(any(test, feature = "test-support"))]
pub mod testutil;

use std::io::Read;
use std::path::Path;

use tardis_types::datafile::url_scheme;
use tardis_types::{Datafile, Result, TardisError};

pub use http_provider::HttpProvider;
pub use metadata::RemoteMetadata;
pub use registry::{ProviderKind, ProviderSettings, build_provider};
pub use scp_provider::ScpProvider;
pub use webdav_provider::WebDavProvider;

/// Transport to one remote storage location.
///
/// Every operation that addresses a remote object first checks that the URL
/// lies under this provider's base URL, so one destination's provider can never
/// be used to reach another destination's objects.
pub trait TransferProvider: Send + Sync {
    /// Label used in error messages (the destination name).
    fn name(&self) -> &str;

    /// Base URL, always ending in `/`.
    fn base_url(&self) -> &str;

    /// Whether the remote answers at all.
    fn alive(&self) -> bool;

    /// Byte length of the remote object.
    fn get_length(&self, url: &str) -> Result<u64>;

    /// Hashes and length as reported by the remote side. Fails with
    /// `NotImplemented` when the destination does not support metadata queries.
    fn get_metadata(&self, url: &str) -> Result<RemoteMetadata>;

    /// Stream the remote object's bytes.
    fn get_file(&self, url: &str) -> Result<Box<dyn Read + Send>>;

    /// Upload a local file so that a later `get_file(url)` returns the same bytes.
    fn put_file(&self, source: &Path, url: &str) -> Result<()>;

    /// Delete the remote object. Deleting an absent object succeeds.
    fn remove_file(&self, url: &str) -> Result<()>;

    /// Ask the remote side to move the object to offline storage.
    fn send_offline(&self, url: &str) -> Result<()> {
        self.check_url(url)?;
        Err(TardisError::NotImplemented(format!(
            "send offline on the {} destination",
            self.name()
        )))
    }

    /// Fail unless `url` belongs to this provider. Parent segments are
    /// rejected, since they would step outside the base URL.
    fn check_url(&self, url: &str) -> Result<()> {
        if !url.starts_with(self.base_url()) {
            return Err(TardisError::Provider(format!(
                "url {url} does not belong to the {} destination ({})",
                self.name(),
                self.base_url()
            )));
        }
        let escapes = relative_path(self.base_url(), url)
            .split('/')
            .any(|seg| seg == ".." || seg.eq_ignore_ascii_case("%2e%2e"));
        if escapes {
            return Err(TardisError::Provider(format!(
                "url {url} leaves the base of the {} destination",
                self.name()
            )));
        }
        Ok(())
    }

    /// URL the datafile would occupy on this destination.
    fn generate_url(&self, datafile: &Datafile) -> Result<String> {
        let path = match url_scheme(&datafile.url) {
            None => datafile.url.as_str(),
            Some("file") => &datafile.url["file://".len()..],
            Some(_) => {
                return Err(TardisError::Provider(format!(
                    "cannot generate a {} url for {}",
                    self.name(),
                    datafile.url
                )));
            }
        };
        Ok(join_url(self.base_url(), path))
    }
}

/// Append a relative path to a base URL ending in `/`.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{base}{}", path.trim_start_matches('/'))
}

/// Normalise a configured base URL so it always ends in `/`.
pub fn normalize_base_url(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}

/// Path of `url` relative to `base`, once `check_url` has passed.
pub(crate) fn relative_path<'a>(base: &str, url: &'a str) -> &'a str {
    url.get(base.len()..).unwrap_or("")
}

#[cfg(test)]
mod tests;
