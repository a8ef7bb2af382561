//! Tabular input and output.
//!
//! Inputs are CSV files with a header row; required columns are checked up
//! front so a schema problem is reported once with the full list of missing
//! columns. Outputs are written with a write-to-temp-then-rename discipline so
//! a crash never leaves a truncated file behind.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{IdentityError, IdentityResult, InputError};

/// An opened CSV table with a validated header.
pub struct TableReader {
    path: PathBuf,
    headers: Vec<String>,
    index: HashMap<String, usize>,
    reader: csv::Reader<File>,
}

impl TableReader {
    /// Opens `path` and checks that every `required` column is present.
    ///
    /// # Errors
    /// - `MissingInput` (with `hint` as remediation) if the file does not exist
    /// - `SchemaViolation` listing every absent column
    pub fn open(path: &Path, required: &[&str], hint: &str) -> IdentityResult<Self> {
        if !path.exists() {
            return Err(IdentityError::missing(path, hint));
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();

        let missing: Vec<String> = required
            .iter()
            .filter(|col| !index.contains_key(**col))
            .map(|col| (*col).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(InputError::SchemaViolation {
                path: path.to_path_buf(),
                missing,
            }
            .into());
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            index,
            reader,
        })
    }

    /// Header names in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the table carries `column`.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    /// Reads every data row. Line numbers are 1-based and exclude the header.
    ///
    /// # Errors
    /// Propagates CSV decoding errors.
    pub fn rows(&mut self) -> IdentityResult<Vec<TableRow>> {
        let mut out = Vec::new();
        for (i, record) in self.reader.records().enumerate() {
            let record = record?;
            out.push(TableRow {
                line: i as u64 + 1,
                cells: record.iter().map(str::to_string).collect(),
            });
        }
        Ok(out)
    }

    /// Trimmed cell value for `column`, empty when the column or cell is absent.
    #[must_use]
    pub fn cell<'a>(&self, row: &'a TableRow, column: &str) -> &'a str {
        self.index
            .get(column)
            .and_then(|&i| row.cells.get(i))
            .map_or("", |c| c.trim())
    }
}

/// One data row.
#[derive(Debug, Clone)]
pub struct TableRow {
    pub line: u64,
    pub cells: Vec<String>,
}

/// File writer that commits by atomic rename.
///
/// Data goes to a uniquely-named sibling temp file; [`AtomicWriter::commit`]
/// flushes, fsyncs and renames it over the destination. Dropping an
/// uncommitted writer removes the temp file.
pub struct AtomicWriter {
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl AtomicWriter {
    /// Starts a new write to `final_path`, creating parent directories.
    ///
    /// # Errors
    /// Propagates I/O errors creating the directory or temp file.
    pub fn create(final_path: &Path) -> IdentityResult<Self> {
        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file_name = final_path
            .file_name()
            .map_or_else(|| "table".to_string(), |n| n.to_string_lossy().into_owned());
        let temp_path = final_path.with_file_name(format!(".{file_name}.tmp.{}", Uuid::new_v4()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        Ok(Self {
            temp_path: Some(temp_path),
            final_path: final_path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Writes raw bytes.
    ///
    /// # Errors
    /// Propagates I/O errors.
    pub fn write_all(&mut self, bytes: &[u8]) -> IdentityResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("writer already consumed"))?;
        writer.write_all(bytes)?;
        Ok(())
    }

    /// Flushes, fsyncs and renames over the destination.
    ///
    /// # Errors
    /// Propagates I/O errors; on failure the destination is untouched.
    pub fn commit(mut self) -> IdentityResult<PathBuf> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| std::io::Error::other("writer already consumed"))?;
        let temp_path = self
            .temp_path
            .take()
            .ok_or_else(|| std::io::Error::other("temp path already consumed"))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        if let Err(e) = fs::rename(&temp_path, &self.final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(self.final_path.clone())
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        self.writer.take();
        if let Some(ref temp_path) = self.temp_path {
            if temp_path.exists() {
                let _ = fs::remove_file(temp_path);
            }
        }
    }
}

/// Serializes `rows` under `header` into CSV bytes.
///
/// # Errors
/// Propagates CSV encoding errors.
pub fn encode_rows<I, R>(header: Option<&[&str]>, rows: I) -> IdentityResult<Vec<u8>>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    if let Some(header) = header {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| IdentityError::Io(std::io::Error::other(e.to_string())))
}

/// Writes a complete table atomically.
///
/// # Errors
/// Propagates CSV encoding and I/O errors.
pub fn write_table<I, R>(path: &Path, header: &[&str], rows: I) -> IdentityResult<PathBuf>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let bytes = encode_rows(Some(header), rows)?;
    let mut writer = AtomicWriter::create(path)?;
    writer.write_all(&bytes)?;
    writer.commit()
}
