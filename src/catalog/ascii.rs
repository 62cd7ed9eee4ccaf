//! Whitespace-separated text catalogs.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::Catalog;
use crate::emit::MaskColumn;
use crate::error::{Error, Result};

/// Layout of a text catalog.
#[derive(Debug, Clone)]
pub struct AsciiFormat {
    /// Lines starting with this character are skipped.
    pub comment: Option<char>,
    /// 1-based column holding the right ascension in degrees.
    pub ra_column: usize,
    /// 1-based column holding the declination in degrees.
    pub dec_column: usize,
    /// 1-based columns copied to the output. `None` keeps the whole line.
    pub payload_columns: Option<Vec<usize>>,
}

impl Default for AsciiFormat {
    fn default() -> Self {
        Self {
            comment: Some('#'),
            ra_column: 1,
            dec_column: 2,
            payload_columns: None,
        }
    }
}

impl AsciiFormat {
    pub fn validate(&self) -> Result<()> {
        if self.ra_column == 0 || self.dec_column == 0 {
            return Err(Error::Config("coordinate columns are 1-based".into()));
        }
        if self.ra_column == self.dec_column {
            return Err(Error::Config(format!(
                "RA and Dec cannot share column {}",
                self.ra_column
            )));
        }
        if let Some(cols) = &self.payload_columns
            && cols.iter().any(|&c| c == 0)
        {
            return Err(Error::Config("output columns are 1-based".into()));
        }
        Ok(())
    }

    fn needed_columns(&self) -> usize {
        let payload_max = self
            .payload_columns
            .as_ref()
            .and_then(|cols| cols.iter().copied().max())
            .unwrap_or(0);
        self.ra_column.max(self.dec_column).max(payload_max)
    }
}

pub fn read_ascii(path: &Path, format: &AsciiFormat) -> Result<Catalog<String>> {
    let file = File::open(path).map_err(|e| Error::read(path, e))?;
    parse_ascii(BufReader::new(file), path, format)
}

pub fn parse_ascii(reader: impl BufRead, path: &Path, format: &AsciiFormat) -> Result<Catalog<String>> {
    format.validate()?;
    let needed = format.needed_columns();
    let mut catalog = Catalog::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::read(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(c) = format.comment
            && trimmed.starts_with(c)
        {
            continue;
        }

        let parse_err = |message: String| Error::Parse {
            path: path.to_path_buf(),
            line: lineno + 1,
            message,
        };

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < needed {
            return Err(parse_err(format!(
                "expected at least {needed} columns, found {}",
                fields.len()
            )));
        }

        let coord = |col: usize, what: &str| -> Result<f64> {
            let field = fields[col - 1];
            field
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| parse_err(format!("invalid {what} `{field}`")))
        };
        let ra = coord(format.ra_column, "right ascension")?;
        let dec = coord(format.dec_column, "declination")?;
        if !(0.0..=360.0).contains(&ra) {
            return Err(parse_err(format!("right ascension {ra} outside [0, 360]")));
        }
        if !(-90.0..=90.0).contains(&dec) {
            return Err(parse_err(format!("declination {dec} outside [-90, 90]")));
        }

        let payload = match &format.payload_columns {
            None => trimmed.to_string(),
            Some(cols) => cols
                .iter()
                .map(|&c| fields[c - 1])
                .collect::<Vec<_>>()
                .join(" "),
        };
        catalog.push(ra, dec, payload)?;
    }
    Ok(catalog)
}

/// Write `payload mask [subsample]` rows.
///
/// Rows go to a temporary file next to `path`, which is renamed into place
/// once everything is flushed, so a failed run leaves no partial output.
pub fn write_ascii(
    path: &Path,
    payloads: &[String],
    mask: &MaskColumn,
    subsample: Option<&[u8]>,
) -> Result<()> {
    if mask.len() != payloads.len() || subsample.is_some_and(|s| s.len() != payloads.len()) {
        return Err(Error::Internal(format!(
            "{} rows but {} mask codes",
            payloads.len(),
            mask.len()
        )));
    }

    let tmp = temp_sibling(path);
    let result = write_rows(&tmp, payloads, mask, subsample)
        .and_then(|()| fs::rename(&tmp, path).map_err(|e| Error::write(path, e)));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_rows(
    tmp: &Path,
    payloads: &[String],
    mask: &MaskColumn,
    subsample: Option<&[u8]>,
) -> Result<()> {
    let file = File::create(tmp).map_err(|e| Error::write(tmp, e))?;
    let mut w = BufWriter::new(file);
    for (i, payload) in payloads.iter().enumerate() {
        let row = match subsample {
            Some(ids) => writeln!(w, "{payload} {} {}", mask.get(i), ids[i]),
            None => writeln!(w, "{payload} {}", mask.get(i)),
        };
        row.map_err(|e| Error::write(tmp, e))?;
    }
    w.flush().map_err(|e| Error::write(tmp, e))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}
