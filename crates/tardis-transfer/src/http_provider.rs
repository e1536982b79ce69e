use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tardis_types::{Result, TardisError};
use tracing::debug;

use crate::http_util::{basic_auth, extract_content_length, map_ureq_error, metadata_url};
use crate::metadata::RemoteMetadata;
use crate::{TransferProvider, normalize_base_url};

/// Plain HTTP destination: `HEAD`/`GET`/`PUT`/`DELETE` plus `GET <url>?metadata`.
pub struct HttpProvider {
    name: String,
    base_url: String,
    agent: ureq::Agent,
    auth: Option<String>,
    metadata_supported: bool,
}

impl HttpProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        credentials: Option<(&str, &str)>,
        metadata_supported: bool,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();

        Self {
            name: name.to_string(),
            base_url: normalize_base_url(base_url),
            agent,
            auth: credentials.map(|(user, password)| basic_auth(user, password)),
            metadata_supported,
        }
    }

    pub(crate) fn apply_auth(&self, req: ureq::Request) -> ureq::Request {
        match self.auth {
            Some(ref auth) => req.set("Authorization", auth),
            None => req,
        }
    }
}

impl TransferProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn alive(&self) -> bool {
        match self.apply_auth(self.agent.head(&self.base_url)).call() {
            Ok(_) => true,
            Err(ureq::Error::Status(status, _)) => status < 500,
            Err(e) => {
                debug!(destination = %self.name, error = %e, "liveness probe failed");
                false
            }
        }
    }

    fn get_length(&self, url: &str) -> Result<u64> {
        self.check_url(url)?;
        let context = format!("HEAD {url}");
        let resp = self
            .apply_auth(self.agent.head(url))
            .call()
            .map_err(|e| map_ureq_error(&context, e))?;
        extract_content_length(&resp, &context)
    }

    fn get_metadata(&self, url: &str) -> Result<RemoteMetadata> {
        self.check_url(url)?;
        if !self.metadata_supported {
            return Err(TardisError::NotImplemented(format!(
                "metadata queries on the {} destination",
                self.name
            )));
        }
        let query = metadata_url(url);
        let context = format!("GET {query}");
        let resp = self
            .apply_auth(self.agent.get(&query))
            .call()
            .map_err(|e| map_ureq_error(&context, e))?;
        resp.into_json::<RemoteMetadata>()
            .map_err(|e| TardisError::Provider(format!("{context}: invalid metadata response: {e}")))
    }

    fn get_file(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        self.check_url(url)?;
        let resp = self
            .apply_auth(self.agent.get(url))
            .call()
            .map_err(|e| map_ureq_error(&format!("GET {url}"), e))?;
        Ok(Box::new(resp.into_reader()))
    }

    fn put_file(&self, source: &Path, url: &str) -> Result<()> {
        self.check_url(url)?;
        let file = File::open(source)?;
        let len = file.metadata()?.len();
        self.apply_auth(self.agent.put(url))
            .set("Content-Type", "application/octet-stream")
            .set("Content-Length", &len.to_string())
            .send(file)
            .map_err(|e| map_ureq_error(&format!("PUT {url}"), e))?;
        debug!(destination = %self.name, url, bytes = len, "uploaded");
        Ok(())
    }

    fn remove_file(&self, url: &str) -> Result<()> {
        self.check_url(url)?;
        match self.apply_auth(self.agent.delete(url)).call() {
            Ok(_) | Err(ureq::Error::Status(404, _)) => Ok(()),
            Err(e) => Err(map_ureq_error(&format!("DELETE {url}"), e)),
        }
    }
}
