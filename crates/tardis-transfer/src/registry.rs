use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tardis_types::{Result, TardisError};

use tardis_types::datafile::url_scheme;
use crate::{HttpProvider, ScpProvider, TransferProvider, WebDavProvider};

/// The transports this build knows about. Configuration selects one by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Http,
    Webdav,
    Scp,
}

impl ProviderKind {
    /// URL schemes a base URL for this transport may use.
    pub fn schemes(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Http | ProviderKind::Webdav => &["http", "https"],
            ProviderKind::Scp => &["scp"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ProviderKind::Http => "http",
            ProviderKind::Webdav => "webdav",
            ProviderKind::Scp => "scp",
        };
        f.write_str(tag)
    }
}

/// Connection parameters for one destination's transport.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub base_url: String,
    pub metadata_supported: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssh_key: Option<PathBuf>,
    pub ssh_known_hosts: Option<PathBuf>,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            metadata_supported: false,
            user: None,
            password: None,
            ssh_key: None,
            ssh_known_hosts: None,
            timeout: Duration::from_secs(300),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        }
    }
}

/// Construct the transport for `kind`.
pub fn build_provider(
    kind: ProviderKind,
    settings: &ProviderSettings,
) -> Result<Box<dyn TransferProvider>> {
    if !url_scheme(&settings.base_url).is_some_and(|s| kind.schemes().contains(&s)) {
        return Err(TardisError::Config(format!(
            "destination '{}': base_url '{}' is not a {kind} url",
            settings.name, settings.base_url
        )));
    }
    Ok(match kind {
        ProviderKind::Http => Box::new(HttpProvider::new(
            &settings.name,
            &settings.base_url,
            settings.credentials(),
            settings.metadata_supported,
            settings.timeout,
        )),
        ProviderKind::Webdav => Box::new(WebDavProvider::new(
            &settings.name,
            &settings.base_url,
            settings.credentials(),
            settings.metadata_supported,
            settings.timeout,
        )),
        ProviderKind::Scp => Box::new(ScpProvider::new(
            &settings.name,
            &settings.base_url,
            settings.user.as_deref(),
            settings.ssh_key.as_deref(),
            settings.ssh_known_hosts.as_deref(),
            settings.metadata_supported,
            settings.timeout,
        )?),
    })
}
