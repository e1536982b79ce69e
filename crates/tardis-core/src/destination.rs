use std::fmt;

use tardis_transfer::{TransferProvider, build_provider};
use tardis_types::{Result, TardisError};

use crate::config::{DestinationConfig, TardisConfig};

/// A named remote storage target bound to one transport.
pub struct Destination {
    name: String,
    trust_length: bool,
    datafile_protocol: String,
    metadata_supported: bool,
    provider: Box<dyn TransferProvider>,
}

impl Destination {
    pub fn new(name: &str, provider: Box<dyn TransferProvider>) -> Self {
        Self {
            name: name.to_string(),
            trust_length: false,
            datafile_protocol: String::new(),
            metadata_supported: false,
            provider,
        }
    }

    pub fn with_trust_length(mut self, trust_length: bool) -> Self {
        self.trust_length = trust_length;
        self
    }

    pub fn with_datafile_protocol(mut self, protocol: &str) -> Self {
        self.datafile_protocol = protocol.to_string();
        self
    }

    pub fn with_metadata_supported(mut self, supported: bool) -> Self {
        self.metadata_supported = supported;
        self
    }

    pub fn from_config(config: &DestinationConfig) -> Result<Self> {
        let provider = build_provider(config.provider, &config.provider_settings())?;
        Ok(Self::new(&config.name, provider)
            .with_trust_length(config.trust_length)
            .with_datafile_protocol(&config.datafile_protocol)
            .with_metadata_supported(config.metadata_supported))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        self.provider.base_url()
    }

    /// Accept a matching remote length in place of checksum verification.
    pub fn trust_length(&self) -> bool {
        self.trust_length
    }

    /// Protocol tag recorded on datafiles migrated here.
    pub fn datafile_protocol(&self) -> &str {
        &self.datafile_protocol
    }

    pub fn metadata_supported(&self) -> bool {
        self.metadata_supported
    }

    pub fn provider(&self) -> &dyn TransferProvider {
        self.provider.as_ref()
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.name)
            .field("base_url", &self.base_url())
            .field("trust_length", &self.trust_length)
            .field("datafile_protocol", &self.datafile_protocol)
            .finish()
    }
}

/// All configured destinations, built once at start-up.
#[derive(Debug, Default)]
pub struct Destinations {
    list: Vec<Destination>,
    default: Option<String>,
}

impl Destinations {
    pub fn from_config(config: &TardisConfig) -> Result<Self> {
        let list = config
            .destinations
            .iter()
            .map(Destination::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            list,
            default: config.default_destination.clone(),
        })
    }

    pub fn new(list: Vec<Destination>, default: Option<&str>) -> Self {
        Self {
            list,
            default: default.map(str::to_string),
        }
    }

    pub fn get(&self, name: &str) -> Result<&Destination> {
        self.list
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| TardisError::Config(format!("unknown destination '{name}'")))
    }

    /// The named destination, or the configured default.
    pub fn select(&self, name: Option<&str>) -> Result<&Destination> {
        match name.or(self.default.as_deref()) {
            Some(name) => self.get(name),
            None => Err(TardisError::Config(
                "no destination given and no default_destination configured".into(),
            )),
        }
    }

    /// The destination whose base URL is the longest prefix of `url`.
    pub fn for_url(&self, url: &str) -> Option<&Destination> {
        self.list
            .iter()
            .filter(|d| url.starts_with(d.base_url()))
            .max_by_key(|d| d.base_url().len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Destination> {
        self.list.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tardis_transfer::testutil::MemoryProvider;

    fn dest(name: &str, base: &str) -> Destination {
        Destination::new(name, Box::new(MemoryProvider::new(name, base)))
    }

    #[test]
    fn for_url_prefers_longest_prefix() {
        let dests = Destinations::new(
            vec![dest("outer", "http://h/data/"), dest("inner", "http://h/data/deep/")],
            None,
        );
        assert_eq!(dests.for_url("http://h/data/deep/x").unwrap().name(), "inner");
        assert_eq!(dests.for_url("http://h/data/x").unwrap().name(), "outer");
        assert!(dests.for_url("http://other/x").is_none());
    }

    #[test]
    fn select_falls_back_to_default() {
        let dests = Destinations::new(vec![dest("a", "http://h/a/")], Some("a"));
        assert_eq!(dests.select(None).unwrap().name(), "a");
        assert!(dests.select(Some("b")).is_err());
        let no_default = Destinations::new(vec![dest("a", "http://h/a/")], None);
        assert!(no_default.select(None).is_err());
    }
}
