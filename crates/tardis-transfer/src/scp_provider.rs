use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use tardis_types::{Result, TardisError};
use tempfile::TempDir;
use tracing::debug;

use crate::metadata::RemoteMetadata;
use crate::shell::{run_command_with_timeout, shell_quote};
use crate::{TransferProvider, normalize_base_url, relative_path};

/// SCP destination addressed as `scp://[user@]host[:port]/remote/dir/`.
///
/// Shells out to the system `ssh` and `scp` in batch mode, so authentication
/// is key based (an explicit key file or the user's agent).
pub struct ScpProvider {
    name: String,
    base_url: String,
    host: String,
    port: Option<u16>,
    user: Option<String>,
    /// Remote directory corresponding to the base URL, ending in `/`.
    root: String,
    ssh_key: Option<PathBuf>,
    known_hosts: Option<PathBuf>,
    metadata_supported: bool,
    timeout: Duration,
}

impl ScpProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        user: Option<&str>,
        ssh_key: Option<&Path>,
        known_hosts: Option<&Path>,
        metadata_supported: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url);
        let rest = base_url.strip_prefix("scp://").ok_or_else(|| {
            TardisError::Config(format!("scp destination '{name}': base_url must start with scp://"))
        })?;
        let (authority, path) = rest.split_once('/').ok_or_else(|| {
            TardisError::Config(format!("scp destination '{name}': base_url has no path"))
        })?;
        let (url_user, host_port) = match authority.rsplit_once('@') {
            Some((u, hp)) => (Some(u.to_string()), hp),
            None => (None, authority),
        };
        let (host, port) = match host_port.split_once(':') {
            Some((h, p)) => {
                let port = p.parse::<u16>().map_err(|_| {
                    TardisError::Config(format!("scp destination '{name}': invalid port '{p}'"))
                })?;
                (h.to_string(), Some(port))
            }
            None => (host_port.to_string(), None),
        };
        if host.is_empty() {
            return Err(TardisError::Config(format!(
                "scp destination '{name}': base_url has no host"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            host,
            port,
            user: url_user.or_else(|| user.map(str::to_string)),
            root: format!("/{path}"),
            base_url,
            ssh_key: ssh_key.map(Path::to_path_buf),
            known_hosts: known_hosts.map(Path::to_path_buf),
            metadata_supported,
            timeout,
        })
    }

    fn target(&self) -> String {
        match self.user {
            Some(ref user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// Absolute remote path for an object URL. Only a conservative character
    /// set is accepted since scp may hand the path to a remote shell.
    fn remote_path(&self, url: &str) -> Result<String> {
        self.check_url(url)?;
        let rel = relative_path(&self.base_url, url);
        let safe = rel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-/+@%=,~".contains(c));
        if rel.is_empty() || !safe || rel.split('/').any(|seg| seg == "..") {
            return Err(TardisError::Provider(format!(
                "unsupported path for the {} destination: {rel:?}",
                self.name
            )));
        }
        Ok(format!("{}{}", self.root, rel.trim_start_matches('/')))
    }

    fn common_options(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o".into(), "BatchMode=yes".into()];
        match self.known_hosts {
            Some(ref path) => {
                let mut opt = OsString::from("UserKnownHostsFile=");
                opt.push(path);
                args.extend(["-o".into(), opt]);
                args.extend(["-o".into(), "StrictHostKeyChecking=yes".into()]);
            }
            None => args.extend(["-o".into(), "StrictHostKeyChecking=accept-new".into()]),
        }
        if let Some(ref key) = self.ssh_key {
            args.push("-i".into());
            args.push(key.into());
        }
        args
    }

    fn ssh_command(&self, remote_cmd: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(self.common_options());
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        cmd.arg(self.target()).arg(remote_cmd);
        cmd
    }

    fn scp_command(&self, from: impl Into<OsString>, to: impl Into<OsString>) -> Command {
        let mut cmd = Command::new("scp");
        cmd.arg("-B").arg("-q");
        cmd.args(self.common_options());
        if let Some(port) = self.port {
            cmd.arg("-P").arg(port.to_string());
        }
        cmd.arg(from.into()).arg(to.into());
        cmd
    }

    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{path}", self.target())
    }

    fn run(&self, mut cmd: Command, context: &str) -> Result<Output> {
        let output = run_command_with_timeout(&mut cmd, self.timeout)
            .map_err(|e| TardisError::Transfer(format!("{context}: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TardisError::Transfer(format!(
                "{context}: {} ({})",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    fn run_remote(&self, remote_cmd: &str, context: &str) -> Result<String> {
        let output = self.run(self.ssh_command(remote_cmd), context)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Downloaded object, deleted along with its directory when dropped.
struct SpooledFile {
    file: File,
    _dir: TempDir,
}

impl Read for SpooledFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

fn parse_length(text: &str, context: &str) -> Result<u64> {
    text.trim()
        .parse()
        .map_err(|_| TardisError::Provider(format!("{context}: unexpected output {text:?}")))
}

fn first_field(line: Option<&str>, context: &str) -> Result<String> {
    line.and_then(|l| l.split_whitespace().next())
        .map(str::to_lowercase)
        .ok_or_else(|| TardisError::Provider(format!("{context}: truncated output")))
}

impl TransferProvider for ScpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn alive(&self) -> bool {
        match self.run(self.ssh_command("true"), "ssh probe") {
            Ok(_) => true,
            Err(e) => {
                debug!(destination = %self.name, error = %e, "liveness probe failed");
                false
            }
        }
    }

    fn get_length(&self, url: &str) -> Result<u64> {
        let path = self.remote_path(url)?;
        let context = format!("stat {url}");
        let out = self.run_remote(&format!("stat -c %s -- {}", shell_quote(&path)), &context)?;
        parse_length(&out, &context)
    }

    fn get_metadata(&self, url: &str) -> Result<RemoteMetadata> {
        let path = self.remote_path(url)?;
        if !self.metadata_supported {
            return Err(TardisError::NotImplemented(format!(
                "metadata queries on the {} destination",
                self.name
            )));
        }
        let quoted = shell_quote(&path);
        let context = format!("checksum {url}");
        let out = self.run_remote(
            &format!("md5sum -- {quoted} && sha512sum -- {quoted} && stat -c %s -- {quoted}"),
            &context,
        )?;
        let mut lines = out.lines();
        let md5sum = first_field(lines.next(), &context)?;
        let sha512sum = first_field(lines.next(), &context)?;
        let length = parse_length(lines.next().unwrap_or(""), &context)?;
        Ok(RemoteMetadata {
            md5sum: Some(md5sum),
            sha512sum: Some(sha512sum),
            length: Some(length),
        })
    }

    fn get_file(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.remote_path(url)?;
        let dir = tempfile::tempdir()?;
        let local = dir.path().join("content");
        self.run(
            self.scp_command(self.remote_spec(&path), local.as_os_str()),
            &format!("scp get {url}"),
        )?;
        let file = File::open(&local)?;
        Ok(Box::new(SpooledFile { file, _dir: dir }))
    }

    fn put_file(&self, source: &Path, url: &str) -> Result<()> {
        let path = self.remote_path(url)?;
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !parent.is_empty() {
                self.run_remote(
                    &format!("mkdir -p -- {}", shell_quote(parent)),
                    &format!("mkdir for {url}"),
                )?;
            }
        }
        self.run(
            self.scp_command(source.as_os_str(), self.remote_spec(&path)),
            &format!("scp put {url}"),
        )?;
        debug!(destination = %self.name, url, "uploaded");
        Ok(())
    }

    fn remove_file(&self, url: &str) -> Result<()> {
        let path = self.remote_path(url)?;
        self.run_remote(&format!("rm -f -- {}", shell_quote(&path)), &format!("rm {url}"))?;
        Ok(())
    }
}
