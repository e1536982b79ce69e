use std::io::Write;

use chrono::Utc;
use serde::Serialize;
use tardis_types::{Datafile, Dataset, Experiment, Result};

/// Writes the structural metadata placed first in every archive.
pub trait ManifestExporter: Send + Sync {
    /// Member name of the manifest inside the archive.
    fn manifest_name(&self) -> &str;

    fn export(
        &self,
        experiment: &Experiment,
        datasets: &[Dataset],
        datafiles: &[Datafile],
        out: &mut dyn Write,
    ) -> Result<()>;
}

pub const MANIFEST_NAME: &str = "manifest.json";
const MANIFEST_FORMAT: &str = "tardis-archive-manifest";

#[derive(Serialize)]
struct Manifest<'a> {
    format: &'static str,
    version: u32,
    exported: chrono::DateTime<Utc>,
    experiment: &'a Experiment,
    datasets: &'a [Dataset],
    datafiles: Vec<ManifestDatafile<'a>>,
}

#[derive(Serialize)]
struct ManifestDatafile<'a> {
    id: u64,
    dataset_id: u64,
    filename: &'a str,
    size: Option<u64>,
    md5sum: Option<&'a str>,
    sha512sum: Option<&'a str>,
    mimetype: Option<&'a str>,
    created: chrono::DateTime<Utc>,
    modified: chrono::DateTime<Utc>,
}

/// JSON manifest: the experiment, its datasets, and per-datafile metadata.
/// Storage locations are not recorded.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonManifestExporter;

impl ManifestExporter for JsonManifestExporter {
    fn manifest_name(&self) -> &str {
        MANIFEST_NAME
    }

    fn export(
        &self,
        experiment: &Experiment,
        datasets: &[Dataset],
        datafiles: &[Datafile],
        out: &mut dyn Write,
    ) -> Result<()> {
        let manifest = Manifest {
            format: MANIFEST_FORMAT,
            version: 1,
            exported: Utc::now(),
            experiment,
            datasets,
            datafiles: datafiles
                .iter()
                .map(|df| ManifestDatafile {
                    id: df.id,
                    dataset_id: df.dataset_id,
                    filename: &df.filename,
                    size: df.size,
                    md5sum: df.md5sum.as_deref(),
                    sha512sum: df.sha512sum.as_deref(),
                    mimetype: df.mimetype.as_deref(),
                    created: df.created,
                    modified: df.modified,
                })
                .collect(),
        };
        serde_json::to_writer_pretty(&mut *out, &manifest)?;
        out.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_datafiles_without_locations() {
        let experiment = Experiment::new(7, "Beamline run", &["alice"]);
        let datasets = vec![Dataset::new(3, "scan", &[7])];
        let mut df = Datafile::new(11, 3, "frame.h5", "7/3/frame.h5");
        df.md5sum = Some("abc".into());

        let mut out = Vec::new();
        JsonManifestExporter
            .export(&experiment, &datasets, &[df], &mut out)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["format"], MANIFEST_FORMAT);
        assert_eq!(value["experiment"]["id"], 7);
        assert_eq!(value["datafiles"][0]["filename"], "frame.h5");
        assert_eq!(value["datafiles"][0]["md5sum"], "abc");
        assert!(value["datafiles"][0].get("url").is_none());
    }
}
