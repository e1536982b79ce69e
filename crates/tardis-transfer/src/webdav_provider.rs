use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tardis_types::Result;
use tracing::debug;

use crate::http_provider::HttpProvider;
use crate::http_util::map_ureq_error;
use crate::metadata::RemoteMetadata;
use crate::{TransferProvider, relative_path};

/// WebDAV destination. Behaves like [`HttpProvider`] but creates the parent
/// collections of a target with `MKCOL` before uploading.
pub struct WebDavProvider {
    http: HttpProvider,
    /// Does not follow redirects, so a 301 on MKCOL is seen as such.
    mkcol_agent: ureq::Agent,
}

impl WebDavProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        credentials: Option<(&str, &str)>,
        metadata_supported: bool,
        timeout: Duration,
    ) -> Self {
        let mkcol_agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(timeout)
            .redirects(0)
            .build();
        Self {
            http: HttpProvider::new(name, base_url, credentials, metadata_supported, timeout),
            mkcol_agent,
        }
    }

    /// Collection URLs between the base URL and the object, outermost first.
    fn parent_collections(&self, url: &str) -> Vec<String> {
        let base = self.http.base_url();
        let rel = relative_path(base, url);
        let mut segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
        segments.pop();

        let mut current = base.to_string();
        segments
            .into_iter()
            .map(|segment| {
                current.push_str(segment);
                current.push('/');
                current.clone()
            })
            .collect()
    }

    /// Create every missing parent collection. Concurrent writers may race us
    /// to the same collection, so "already exists" (405) and redirects (301)
    /// count as success.
    fn create_collections(&self, url: &str) -> Result<()> {
        for collection in self.parent_collections(url) {
            let req = self
                .http
                .apply_auth(self.mkcol_agent.request("MKCOL", &collection));
            match req.call() {
                Ok(_) | Err(ureq::Error::Status(301 | 405, _)) => {
                    debug!(destination = %self.http.name(), collection = %collection, "collection ready");
                }
                Err(e) => return Err(map_ureq_error(&format!("MKCOL {collection}"), e)),
            }
        }
        Ok(())
    }
}

impl TransferProvider for WebDavProvider {
    fn name(&self) -> &str {
        self.http.name()
    }

    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    fn alive(&self) -> bool {
        self.http.alive()
    }

    fn get_length(&self, url: &str) -> Result<u64> {
        self.http.get_length(url)
    }

    fn get_metadata(&self, url: &str) -> Result<RemoteMetadata> {
        self.http.get_metadata(url)
    }

    fn get_file(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        self.http.get_file(url)
    }

    fn put_file(&self, source: &Path, url: &str) -> Result<()> {
        self.check_url(url)?;
        self.create_collections(url)?;
        self.http.put_file(source, url)
    }

    fn remove_file(&self, url: &str) -> Result<()> {
        self.http.remove_file(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> WebDavProvider {
        WebDavProvider::new(
            "dav",
            "http://127.0.0.1:9/dav",
            None,
            false,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn parent_collections_outermost_first() {
        let p = provider();
        assert_eq!(
            p.parent_collections("http://127.0.0.1:9/dav/1/2/3"),
            vec![
                "http://127.0.0.1:9/dav/1/".to_string(),
                "http://127.0.0.1:9/dav/1/2/".to_string(),
            ]
        );
    }

    #[test]
    fn object_at_base_needs_no_collections() {
        let p = provider();
        assert!(p.parent_collections("http://127.0.0.1:9/dav/file").is_empty());
    }
}
