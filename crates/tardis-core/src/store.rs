use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use tardis_types::{Result, TardisError};
use tracing::debug;

/// Local file store: datafile URLs that are relative paths (or `file://`
/// URLs, whose path is taken relative to the store) live under `root`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_relative(rel: &str, url: &str) -> Result<()> {
        if rel.is_empty() {
            return Err(TardisError::Provider(format!("unsafe datafile url: empty '{url}'")));
        }
        if rel.contains('\\') {
            return Err(TardisError::Provider(format!(
                "unsafe datafile url: contains backslash '{url}'"
            )));
        }
        for component in Path::new(rel).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(TardisError::Provider(format!(
                        "unsafe datafile url: escapes the file store '{url}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Store-relative path for a local datafile URL.
    pub fn relative<'a>(&self, url: &'a str) -> Result<&'a str> {
        let rel = match url.strip_prefix("file://") {
            Some(path) => path.trim_start_matches('/'),
            None if url.starts_with('/') => {
                return Err(TardisError::Provider(format!(
                    "unsafe datafile url: absolute path '{url}'"
                )));
            }
            None => url,
        };
        Self::validate_relative(rel, url)?;
        Ok(rel)
    }

    /// Absolute filesystem path for a local datafile URL.
    pub fn resolve(&self, url: &str) -> Result<PathBuf> {
        Ok(self.root.join(self.relative(url)?))
    }

    pub fn open(&self, url: &str) -> Result<File> {
        let path = self.resolve(url)?;
        File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TardisError::NotFound(format!("local file {}", path.display()))
            } else {
                e.into()
            }
        })
    }

    pub fn exists(&self, url: &str) -> bool {
        self.resolve(url).is_ok_and(|p| p.is_file())
    }

    pub fn size(&self, url: &str) -> Result<u64> {
        Ok(fs::metadata(self.resolve(url)?)?.len())
    }

    /// Write bytes at a datafile URL, creating parent directories.
    pub fn write(&self, url: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.resolve(url)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(path)
    }

    /// Delete the file behind a local URL, then any parent directories left
    /// empty, stopping at the store root.
    pub fn remove(&self, url: &str) -> Result<()> {
        let path = self.resolve(url)?;
        fs::remove_file(&path)?;

        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            match fs::remove_dir(current) {
                Ok(()) => debug!(dir = %current.display(), "removed empty directory"),
                Err(_) => break,
            }
            dir = current.parent();
        }
        Ok(())
    }
}
