//! File loading: find the exports in the data directory and turn each into a
//! normalized, coerced [`FileBatch`]. A broken file is reported and skipped;
//! it never fails the pass.

use anyhow::{bail, Context, Result};
use glob::{glob_with, MatchOptions, Pattern};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub mod report;

use crate::config::LoaderConfig;
use crate::process::{
    convert::{coerce, Coerced},
    header::HeaderConvention,
    read_export,
    utils::{provenance_from_filename, PROVENANCE_FIELDS},
};
pub use report::{FileOutcome, FileState, LoadReport};

/// One file's rows, ready for unification.
#[derive(Debug, Clone)]
pub struct FileBatch {
    pub source_file: String,
    pub convention: HeaderConvention,
    /// File columns followed by the provenance columns.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Coerced>>,
}

pub struct LoadOutcome {
    pub batches: Vec<FileBatch>,
    pub report: LoadReport,
}

/// List files with `extension` (case-insensitive) directly inside `dir`,
/// sorted by name so ingestion order is stable.
pub fn discover_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!(
            "data directory `{}` does not exist or is not a directory",
            dir.display()
        );
    }

    let pattern = format!(
        "{}/*.{}",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(extension)
    );
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut files = Vec::new();
    for entry in glob_with(&pattern, options).context("invalid glob pattern for data directory")? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("cannot read directory entry: {}", e),
        }
    }
    files.sort();
    Ok(files)
}

/// Read, normalize and coerce one export and attach its provenance.
pub fn load_file(path: &Path, config: &LoaderConfig) -> Result<FileBatch> {
    let table = read_export(path, &config.read_options())?;
    let provenance = provenance_from_filename(&table.file_name);

    let numeric: Vec<bool> = table
        .headers
        .iter()
        .map(|name| !config.is_text_field(name))
        .collect();

    let rows = table
        .rows
        .iter()
        .map(|raw| {
            let mut row: Vec<Coerced> = raw
                .iter()
                .zip(&numeric)
                .map(|(cell, is_numeric)| coerce(cell, *is_numeric))
                .collect();
            row.extend(
                provenance
                    .values()
                    .iter()
                    .map(|v| Coerced::Text(v.to_string())),
            );
            row
        })
        .collect();

    let mut columns = table.headers;
    columns.extend(PROVENANCE_FIELDS.iter().map(|s| s.to_string()));

    Ok(FileBatch {
        source_file: table.file_name,
        convention: table.convention,
        columns,
        rows,
    })
}

/// Load every export in the configured directory, in parallel.
///
/// Only an unreadable directory is an error; per-file failures end up in the
/// report as [`FileState::Skipped`].
#[tracing::instrument(level = "info", skip(config), fields(dir = %config.data_dir.display()))]
pub fn load_directory(config: &LoaderConfig) -> Result<LoadOutcome> {
    let mut report = LoadReport::new(&config.data_dir);
    let files = discover_files(&config.data_dir, config.extension())?;
    info!("discovered {} .{} files", files.len(), config.extension());

    let results: Vec<(PathBuf, Result<FileBatch>)> = files
        .into_par_iter()
        .map(|path| {
            let res = load_file(&path, config);
            (path, res)
        })
        .collect();

    let mut batches = Vec::with_capacity(results.len());
    for (path, res) in results {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        match res {
            Ok(batch) => {
                debug!(file = %name, convention = %batch.convention, rows = batch.rows.len(), "loaded");
                report
                    .files
                    .push(FileOutcome::loaded(name, batch.convention, batch.rows.len()));
                batches.push(batch);
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(file = %name, "skipping file: {}", reason);
                report.files.push(FileOutcome::skipped(name, reason));
            }
        }
    }

    report.finish();
    info!(
        loaded = report.loaded().count(),
        skipped = report.skipped().count(),
        rows = report.rows_loaded(),
        "load pass finished"
    );
    Ok(LoadOutcome { batches, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    const SINGLE_ROW: &str = "Merkmal;Erststimmen_Anzahl;Erststimmen_Anteil\nSPD;100;\"12,5 %\"\nAfD;-;30\n";

    #[test]
    fn discovers_matching_files_in_name_order() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("wahlkreis_02_B.csv"), SINGLE_ROW)?;
        fs::write(dir.path().join("wahlkreis_01_A.CSV"), SINGLE_ROW)?;
        fs::write(dir.path().join("notes.txt"), "ignore me")?;
        fs::create_dir(dir.path().join("nested.csv"))?;

        let files = discover_files(dir.path(), "csv")?;
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["wahlkreis_01_A.CSV", "wahlkreis_02_B.csv"]);
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(discover_files(&dir.path().join("absent"), "csv").is_err());
    }

    #[test]
    fn load_file_coerces_and_tags_provenance() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("gemeinde_07_120_Bad_Belzig.csv");
        fs::write(&path, SINGLE_ROW)?;

        let batch = load_file(&path, &LoaderConfig::with_data_dir(dir.path()))?;
        assert_eq!(
            batch.columns,
            vec![
                "merkmal",
                "erststimmenAnzahl",
                "erststimmenAnteil",
                "sourceFile",
                "sourceType",
                "districtId",
                "subUnitId",
                "locationName"
            ]
        );
        assert_eq!(batch.rows[0][0], Coerced::Text("SPD".into()));
        assert_eq!(batch.rows[0][2], Coerced::Number(12.5));
        assert_eq!(batch.rows[1][1], Coerced::missing());
        assert_eq!(batch.rows[1][6], Coerced::Text("120".into()));
        assert_eq!(batch.rows[1][7], Coerced::Text("Bad Belzig".into()));
        Ok(())
    }

    #[test]
    fn corrupted_file_is_skipped_and_reported() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("wahlkreis_01_A.csv"), SINGLE_ROW)?;
        fs::write(dir.path().join("wahlkreis_02_B.csv"), b"Merkmal;Anzahl\n\xff;1\n")?;
        fs::write(dir.path().join("wahlkreis_03_C.csv"), SINGLE_ROW)?;

        let outcome = load_directory(&LoaderConfig::with_data_dir(dir.path()))?;
        assert_eq!(outcome.batches.len(), 2);
        assert_eq!(outcome.batches[0].source_file, "wahlkreis_01_A.csv");
        assert_eq!(outcome.batches[1].source_file, "wahlkreis_03_C.csv");

        let skipped: Vec<_> = outcome.report.skipped().collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].file, "wahlkreis_02_B.csv");
        assert!(skipped[0].reason.as_deref().unwrap().contains("UTF-8"));
        assert_eq!(outcome.report.rows_loaded(), 4);
        Ok(())
    }

    #[test]
    fn empty_directory_loads_nothing() -> Result<()> {
        let dir = tempdir()?;
        let outcome = load_directory(&LoaderConfig::with_data_dir(dir.path()))?;
        assert!(outcome.batches.is_empty());
        assert!(outcome.report.files.is_empty());
        Ok(())
    }
}
