use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol tags under which a datafile's bytes live in the local file store.
pub const LOCAL_PROTOCOLS: &[&str] = &["", "file", "tardis"];

/// Protocol tag for datafiles whose bytes now live inside an archive.
pub const ARCHIVE_PROTOCOL: &str = "archive";

/// A tracked unit of file content and its current location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datafile {
    pub id: u64,
    pub dataset_id: u64,
    pub filename: String,
    /// Relative store path, `file://` URL, or remote URL.
    pub url: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub md5sum: Option<String>,
    #[serde(default)]
    pub sha512sum: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub mimetype: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Datafile {
    /// A fresh, unverified local datafile with no recorded checksums.
    pub fn new(id: u64, dataset_id: u64, filename: &str, url: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            dataset_id,
            filename: filename.to_string(),
            url: url.to_string(),
            protocol: String::new(),
            size: None,
            md5sum: None,
            sha512sum: None,
            verified: false,
            mimetype: None,
            created: now,
            modified: now,
        }
    }

    pub fn is_local(&self) -> bool {
        LOCAL_PROTOCOLS.contains(&self.protocol.as_str())
            && matches!(url_scheme(&self.url), None | Some("file"))
    }

    pub fn has_checksum(&self) -> bool {
        self.md5sum.as_deref().is_some_and(|s| !s.is_empty())
            || self.sha512sum.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Point the record at a new location. A move is not a content change,
    /// so `modified` is left alone.
    pub fn repoint(&mut self, url: &str, protocol: &str) {
        self.url = url.to_string();
        self.protocol = protocol.to_string();
    }
}

/// Lowercased URL scheme, if the string carries one (`scheme://...`).
pub fn url_scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_file_urls_are_local() {
        let df = Datafile::new(1, 1, "a.txt", "1/2/3");
        assert!(df.is_local());
        let df = Datafile::new(1, 1, "a.txt", "file:///data/1/2/3");
        assert!(df.is_local());
    }

    #[test]
    fn remote_scheme_is_not_local() {
        let df = Datafile::new(1, 1, "a.txt", "http://example.org/data/1");
        assert!(!df.is_local());
    }

    #[test]
    fn foreign_protocol_is_not_local() {
        let mut df = Datafile::new(1, 1, "a.txt", "1/2/3");
        df.protocol = ARCHIVE_PROTOCOL.into();
        assert!(!df.is_local());
        df.protocol = "tardis".into();
        assert!(df.is_local());
    }

    #[test]
    fn scheme_parsing() {
        assert_eq!(url_scheme("scp://host/path"), Some("scp"));
        assert_eq!(url_scheme("a/b://c"), None);
        assert_eq!(url_scheme("plain/path"), None);
    }
}
