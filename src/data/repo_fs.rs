//! Filesystem-backed loading of the raw appointment export.
//!
//! `.zip` archives are opened and their first file entry is read as CSV;
//! anything else is read as plain CSV. The first row is the header.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::info;
use zip::ZipArchive;

use crate::common::error::{DataError, NoShowResult};
use crate::common::time;

use super::domain::{RawRecord, RawTable, RecordSource};

/// Reads the raw table from a local file.
pub struct FsRecordSource {
    path: PathBuf,
}

impl FsRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn is_zip(&self) -> bool {
        self.path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false)
    }

    fn load_zip(&self, file: File) -> NoShowResult<RawTable> {
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| DataError::read(self.display(), e))?;
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| DataError::read(self.display(), e))?;
            if entry.is_dir() {
                continue;
            }
            info!("reading {} from {}", entry.name(), self.display());
            return read_csv(entry, &self.display());
        }
        Err(DataError::read(self.display(), "archive contains no files").into())
    }
}

impl RecordSource for FsRecordSource {
    fn load(&self) -> NoShowResult<RawTable> {
        let start = Instant::now();
        let file = File::open(&self.path).map_err(|e| DataError::read(self.display(), e))?;
        let table = if self.is_zip() {
            self.load_zip(file)?
        } else {
            read_csv(BufReader::new(file), &self.display())?
        };
        info!(
            "loaded {} rows x {} columns from {} in {} ms",
            table.len(),
            table.header().len(),
            self.display(),
            time::elapsed_ms(start)
        );
        Ok(table)
    }
}

fn read_csv<R: Read>(reader: R, path: &str) -> NoShowResult<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);
    let header: Vec<String> = rdr
        .headers()
        .map_err(|e| DataError::read(path, e))?
        .iter()
        .map(String::from)
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| DataError::read(path, e))?;
        rows.push(RawRecord::new(record.iter().map(String::from).collect()));
    }
    RawTable::new(header, rows)
}

/// Convenience wrapper for one-off loads.
pub fn load_table(path: impl AsRef<Path>) -> NoShowResult<RawTable> {
    FsRecordSource::new(path.as_ref()).load()
}
