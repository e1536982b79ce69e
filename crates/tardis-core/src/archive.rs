use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use tardis_transfer::join_url;
use tardis_types::archive::ARCHIVE_MIMETYPE;
use tardis_types::datafile::ARCHIVE_PROTOCOL;
use tardis_types::{Archive, Datafile, Result, TardisError};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::catalog::{Catalog, last_experiment_change};
use crate::checksum::{self, Checksums};
use crate::config::PathMapper;
use crate::destination::{Destination, Destinations};
use crate::export::ManifestExporter;
use crate::migrate::discard_remote;
use crate::store::FileStore;
use crate::verify::{ExpectedContent, check_file_transferred};

/// Collaborators the archival engine reads from and writes to.
#[derive(Clone, Copy)]
pub struct ArchiveContext<'a> {
    pub catalog: &'a dyn Catalog,
    pub store: &'a FileStore,
    pub destinations: &'a Destinations,
    pub exporter: &'a dyn ManifestExporter,
}

/// Where a finished archive goes.
#[derive(Debug, Clone, Copy)]
pub enum ArchiveTarget<'a> {
    /// Upload through a destination's provider.
    Location(&'a Destination),
    /// Write into a local directory.
    Directory(&'a Path),
}

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Rehash local datafiles while packaging; mismatches are skipped.
    pub checksums: bool,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// Downgrade size-policy violations to warnings.
    pub force: bool,
    pub send_offline: bool,
    pub path_mapper: PathMapper,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            checksums: false,
            min_size: None,
            max_size: None,
            force: false,
            send_offline: false,
            path_mapper: PathMapper::Dataset,
            scratch_dir: None,
        }
    }
}

/// A datafile packaged into an archive, and the member name it got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedMember {
    pub datafile_id: u64,
    pub member: String,
}

#[derive(Debug, Clone)]
pub struct ArchiveResult {
    pub archive: Archive,
    pub members: Vec<ArchivedMember>,
}

/// File name of an experiment's archive created at `when`.
pub fn archive_name(experiment_id: u64, when: DateTime<Utc>) -> String {
    format!(
        "experiment-{experiment_id}-{}.tar.gz",
        when.format("%Y%m%dT%H%M%S")
    )
}

/// URL an archive named `name` would get at `target`.
fn target_url(target: ArchiveTarget<'_>, name: &str) -> Result<String> {
    Ok(match target {
        ArchiveTarget::Location(dest) => join_url(dest.base_url(), name),
        ArchiveTarget::Directory(dir) => {
            format!("file://{}", std::fs::canonicalize(dir)?.join(name).display())
        }
    })
}

fn target_has(target: ArchiveTarget<'_>, url: &str) -> bool {
    match target {
        ArchiveTarget::Location(dest) => dest.provider().get_length(url).is_ok(),
        ArchiveTarget::Directory(_) => url
            .strip_prefix("file://")
            .is_some_and(|path| Path::new(path).exists()),
    }
}

/// First archive name at `target` that neither an existing object nor an
/// archive record of the experiment uses: `archive_name`, then `-2`, `-3`...
fn free_archive_name(
    catalog: &dyn Catalog,
    target: ArchiveTarget<'_>,
    experiment_id: u64,
    when: DateTime<Utc>,
) -> Result<(String, String)> {
    let recorded: HashSet<String> = catalog
        .archives_for_experiment(experiment_id)?
        .into_iter()
        .filter_map(|a| a.url)
        .collect();
    let base = archive_name(experiment_id, when);
    let stem = base.trim_end_matches(".tar.gz");
    let mut name = base.clone();
    let mut n = 1u32;
    loop {
        let url = target_url(target, &name)?;
        if !recorded.contains(&url) && !target_has(target, &url) {
            return Ok((name, url));
        }
        n += 1;
        name = format!("{stem}-{n}.tar.gz");
    }
}

/// Reduce a datafile name to a single safe path component.
fn sanitize_member_name(filename: &str, fallback: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

/// Member path for a datafile, unique within the archive.
fn member_name(mapper: PathMapper, datafile: &Datafile, used: &mut HashSet<String>) -> String {
    let base = sanitize_member_name(&datafile.filename, &format!("datafile-{}", datafile.id));
    let place = |name: &str| match mapper {
        PathMapper::Flat => name.to_string(),
        PathMapper::Dataset => format!("{}/{name}", datafile.dataset_id),
    };
    let mut name = place(&base);
    let mut attempt = 1u32;
    while !used.insert(name.clone()) {
        name = match attempt {
            1 => place(&format!("{}-{base}", datafile.id)),
            n => place(&format!("{}-{n}-{base}", datafile.id)),
        };
        attempt += 1;
    }
    name
}

/// Fail if `size` falls outside the given bounds.
pub fn check_size_policy(size: u64, min_size: Option<u64>, max_size: Option<u64>) -> Result<()> {
    if let Some(max) = max_size {
        if size > max {
            return Err(TardisError::Archiving(format!(
                "archive size {size} exceeds maximum {max}"
            )));
        }
    }
    if let Some(min) = min_size {
        if size < min {
            return Err(TardisError::Archiving(format!(
                "archive size {size} is below minimum {min}"
            )));
        }
    }
    Ok(())
}

fn scratch_file(dir: Option<&Path>) -> Result<NamedTempFile> {
    Ok(match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            NamedTempFile::new_in(dir)?
        }
        None => NamedTempFile::new()?,
    })
}

/// Open a datafile's bytes for packaging. Remote content is spooled to a
/// scratch file so its length is known before the tar header is written.
fn open_datafile(
    ctx: &ArchiveContext<'_>,
    datafile: &Datafile,
    options: &ArchiveOptions,
) -> Result<(File, u64)> {
    if datafile.protocol == ARCHIVE_PROTOCOL {
        return Err(TardisError::Provider(format!(
            "content is stored inside archive {}",
            datafile.url
        )));
    }

    let mut file = if datafile.is_local() {
        ctx.store.open(&datafile.url)?
    } else {
        let dest = ctx.destinations.for_url(&datafile.url).ok_or_else(|| {
            TardisError::Provider(format!("no destination serves {}", datafile.url))
        })?;
        let mut reader = dest.provider().get_file(&datafile.url)?;
        let mut spool = match options.scratch_dir {
            Some(ref dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        std::io::copy(&mut reader, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;
        spool
    };

    if options.checksums {
        let sums = checksum::compute(&mut file)?;
        checksum::compare_recorded(
            &sums,
            datafile.md5sum.as_deref(),
            datafile.sha512sum.as_deref(),
            datafile.size,
        )?;
        file.seek(SeekFrom::Start(0))?;
    }
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn tar_header(len: u64, mtime: DateTime<Utc>) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_size(len);
    header.set_mode(0o644);
    header.set_mtime(mtime.timestamp().max(0) as u64);
    header.set_cksum();
    header
}

struct Packaged {
    members: Vec<ArchivedMember>,
    nos_errors: u64,
}

/// Write manifest and datafiles into a gzip-compressed tar stream.
fn package(
    ctx: &ArchiveContext<'_>,
    experiment_id: u64,
    options: &ArchiveOptions,
    out: &File,
) -> Result<Packaged> {
    let experiment = ctx.catalog.experiment(experiment_id)?;
    let datasets = ctx.catalog.datasets_for_experiment(experiment_id)?;
    let datafiles = ctx.catalog.datafiles_for_experiment(experiment_id)?;

    let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::default()));
    let now = Utc::now();

    let mut manifest = Vec::new();
    ctx.exporter
        .export(&experiment, &datasets, &datafiles, &mut manifest)?;
    let mut header = tar_header(manifest.len() as u64, now);
    builder.append_data(&mut header, ctx.exporter.manifest_name(), manifest.as_slice())?;

    let mut used = HashSet::from([ctx.exporter.manifest_name().to_string()]);
    let mut members = Vec::new();
    let mut nos_errors = 0u64;
    for datafile in &datafiles {
        let (file, len) = match open_datafile(ctx, datafile, options) {
            Ok(opened) => opened,
            Err(e) => {
                warn!(
                    experiment_id,
                    datafile_id = datafile.id,
                    url = %datafile.url,
                    error = %e,
                    "datafile skipped while archiving"
                );
                nos_errors += 1;
                continue;
            }
        };
        let member = member_name(options.path_mapper, datafile, &mut used);
        let mut header = tar_header(len, datafile.modified);
        builder.append_data(&mut header, &member, file.take(len))?;
        members.push(ArchivedMember {
            datafile_id: datafile.id,
            member,
        });
    }

    builder.into_inner()?.finish()?;
    Ok(Packaged {
        members,
        nos_errors,
    })
}

/// Package an experiment into a tar.gz with a manifest, enforce the size
/// policy, deliver it to `target`, verify, and record an [`Archive`].
///
/// Datafiles that cannot be read are skipped and counted in `nos_errors`.
pub fn archive_experiment(
    ctx: &ArchiveContext<'_>,
    experiment_id: u64,
    target: ArchiveTarget<'_>,
    options: &ArchiveOptions,
) -> Result<ArchiveResult> {
    let experiment = ctx.catalog.experiment(experiment_id)?;
    let changed = last_experiment_change(ctx.catalog, experiment_id)?;
    let created = Utc::now();

    let tmp = match target {
        ArchiveTarget::Location(_) => scratch_file(options.scratch_dir.as_deref())?,
        ArchiveTarget::Directory(dir) => scratch_file(Some(dir))?,
    };
    let packaged = package(ctx, experiment_id, options, tmp.as_file())?;
    let sums: Checksums = checksum::compute(tmp.reopen()?)?;

    if let Err(e) = check_size_policy(sums.length, options.min_size, options.max_size) {
        if !options.force {
            return Err(e);
        }
        warn!(experiment_id, size = sums.length, error = %e, "size policy overridden by force");
    }

    let expected = ExpectedContent {
        md5sum: Some(sums.md5sum.clone()),
        sha512sum: Some(sums.sha512sum.clone()),
        length: Some(sums.length),
    };
    let (name, url) = free_archive_name(ctx.catalog, target, experiment_id, created)?;
    match target {
        ArchiveTarget::Location(dest) => {
            if let Err(e) = dest.provider().put_file(tmp.path(), &url) {
                return Err(discard_remote(dest, &url, e));
            }
            if let Err(e) = check_file_transferred(&expected, dest, &url) {
                return Err(discard_remote(dest, &url, e));
            }
        }
        ArchiveTarget::Directory(dir) => {
            tmp.persist_noclobber(dir.join(&name)).map_err(|e| e.error)?;
        }
    }

    let record = Archive {
        id: 0,
        experiment_id,
        experiment_owner: experiment.primary_owner().unwrap_or_default().to_string(),
        experiment_title: experiment.title.clone(),
        created,
        experiment_changed: changed,
        url: Some(url.clone()),
        md5sum: sums.md5sum,
        sha512sum: sums.sha512sum,
        size: sums.length,
        mimetype: ARCHIVE_MIMETYPE.to_string(),
        nos_files: packaged.members.len() as u64,
        nos_errors: packaged.nos_errors,
    };
    let archive = match ctx.catalog.create_archive(record) {
        Ok(archive) => archive,
        Err(e) => return Err(discard_archive_object(ctx.destinations, &url, e)),
    };

    if options.send_offline {
        if let ArchiveTarget::Location(dest) = target {
            match dest.provider().send_offline(&url) {
                Ok(()) => info!(experiment_id, url = %url, "archive sent offline"),
                Err(e @ TardisError::NotImplemented(_)) => {
                    info!(experiment_id, destination = %dest.name(), error = %e, "send offline not supported")
                }
                Err(e) => warn!(experiment_id, url = %url, error = %e, "send offline failed"),
            }
        }
    }

    info!(
        experiment_id,
        archive_id = archive.id,
        url = %url,
        size = archive.size,
        nos_files = archive.nos_files,
        nos_errors = archive.nos_errors,
        "experiment archived"
    );
    Ok(ArchiveResult {
        archive,
        members: packaged.members,
    })
}

fn discard_archive_object(destinations: &Destinations, url: &str, cause: TardisError) -> TardisError {
    match remove_archive_object(destinations, url) {
        Ok(()) => cause,
        Err(cleanup) => {
            warn!(url, error = %cleanup, "cleanup of archive object failed");
            cause.with_cleanup_failure(cleanup)
        }
    }
}

/// Delete an archive's stored object: a local file for `file://` URLs,
/// otherwise through the destination whose base URL prefixes it.
pub fn remove_archive_object(destinations: &Destinations, url: &str) -> Result<()> {
    if let Some(path) = url.strip_prefix("file://") {
        return match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        };
    }
    let dest = destinations
        .for_url(url)
        .ok_or_else(|| TardisError::Provider(format!("no destination serves {url}")))?;
    dest.provider().remove_file(url)
}

/// Totals from removing archived local copies.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovalStats {
    pub removed: u64,
    pub bytes: u64,
}

/// Repoint every packaged local datafile at its archive member, then delete
/// the local copy. Records are saved before files are removed.
pub fn remove_archived_data(ctx: &ArchiveContext<'_>, result: &ArchiveResult) -> Result<RemovalStats> {
    let archive_url = result
        .archive
        .url
        .as_deref()
        .ok_or_else(|| TardisError::Archiving(format!("archive {} has no url", result.archive.id)))?;

    let mut stats = RemovalStats::default();
    for member in &result.members {
        let mut datafile = ctx.catalog.datafile(member.datafile_id)?;
        if !datafile.is_local() {
            continue;
        }
        let local_url = datafile.url.clone();
        let bytes = ctx.store.size(&local_url).unwrap_or(0);
        datafile.repoint(&format!("{archive_url}#{}", member.member), ARCHIVE_PROTOCOL);
        ctx.catalog.save_datafile(&datafile)?;
        match ctx.store.remove(&local_url) {
            Ok(()) => {
                stats.removed += 1;
                stats.bytes += bytes;
            }
            Err(e) => warn!(datafile_id = datafile.id, error = %e, "local copy not removed"),
        }
    }
    Ok(stats)
}
