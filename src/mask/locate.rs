//! Resolving the maskbit files that cover a brick.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::bricks::BrickRecord;
use crate::error::{Error, Result};

/// Placeholder for the brick name in file name templates.
pub const NAME_PLACEHOLDER: &str = "%s";

/// One maskbit file to apply to a brick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskFile {
    pub path: PathBuf,
    /// Id tagged onto objects covered by this file, if tagging is enabled.
    pub subsample: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct TemplateSource {
    /// File name with a single `%s` standing for the brick name.
    pub template: String,
    pub subsample: Option<u8>,
}

/// A fixed collection of maskbit files, looked up by brick name.
#[derive(Debug, Clone)]
pub struct FileListSource {
    files: Vec<PathBuf>,
    by_token: HashMap<String, usize>,
    pub subsample: Option<u8>,
}

impl FileListSource {
    /// Index `files` by the alphanumeric tokens of their file names. The
    /// first file carrying a token wins. Names that only contain a brick
    /// name inside a longer token are found by [`FileListSource::find`]'s
    /// substring scan.
    pub fn new(files: Vec<PathBuf>, subsample: Option<u8>) -> Self {
        let mut by_token = HashMap::new();
        for (i, path) in files.iter().enumerate() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            for token in name.split(|c: char| !c.is_ascii_alphanumeric()) {
                if !token.is_empty() {
                    by_token.entry(token.to_string()).or_insert(i);
                }
            }
        }
        Self {
            files,
            by_token,
            subsample,
        }
    }

    /// Read a list with one path per line; blank lines and `#` comments are skipped.
    pub fn from_list_file(path: &Path, subsample: Option<u8>) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::read(path, e))?;
        let mut files = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::read(path, e))?;
            let line = line.trim();
            if !line.is_empty() && !line.starts_with('#') {
                files.push(PathBuf::from(line));
            }
        }
        log::debug!("{}: {} maskbit files listed", path.display(), files.len());
        Ok(Self::new(files, subsample))
    }

    /// Collect the files matching a glob pattern.
    pub fn from_glob(pattern: &str, subsample: Option<u8>) -> Result<Self> {
        let entries = glob::glob(pattern)
            .map_err(|e| Error::Config(format!("invalid glob pattern `{pattern}`: {e}")))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                Error::read(path, e.into_error())
            })?;
            files.push(path);
        }
        files.sort();
        log::debug!("`{pattern}`: {} maskbit files found", files.len());
        Ok(Self::new(files, subsample))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The file whose name carries `brick_name` as a token, or else the
    /// first listed file whose name contains it anywhere.
    pub fn find(&self, brick_name: &str) -> Option<&Path> {
        if brick_name.is_empty() {
            return None;
        }
        if let Some(&i) = self.by_token.get(brick_name) {
            return Some(self.files[i].as_path());
        }
        self.files
            .iter()
            .find(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(brick_name))
            })
            .map(PathBuf::as_path)
    }
}

/// Where the maskbit files of a brick live.
#[derive(Debug, Clone)]
pub enum MaskLocator {
    /// `dir/<template with %s = brick name>` per subsample; missing files are skipped.
    Templates {
        dir: PathBuf,
        sources: Vec<TemplateSource>,
    },
    /// Legacy Survey release layout:
    /// `root/<region>/coadd/<first 3 chars>/<name>/legacysurvey-<name>-maskbits.fits.gz`.
    ///
    /// Public release trees ship tile-compressed `-maskbits.fits.fz` files,
    /// which this reader does not decode. Point `FileLists` at decompressed
    /// copies of those instead.
    Convention { root: PathBuf, subsample: Option<u8> },
    /// Explicit file collections per subsample.
    FileLists(Vec<FileListSource>),
}

impl MaskLocator {
    /// Whether covered objects get a subsample id.
    pub fn tags_subsamples(&self) -> bool {
        match self {
            MaskLocator::Templates { sources, .. } => sources.iter().any(|s| s.subsample.is_some()),
            MaskLocator::Convention { subsample, .. } => subsample.is_some(),
            MaskLocator::FileLists(lists) => lists.iter().any(|l| l.subsample.is_some()),
        }
    }

    /// Existing maskbit files for `brick`, in subsample order. An empty list
    /// means the brick has no coverage.
    pub fn resolve(&self, brick: &BrickRecord) -> Vec<MaskFile> {
        match self {
            MaskLocator::Templates { dir, sources } => sources
                .iter()
                .filter_map(|s| {
                    let path = dir.join(s.template.replacen(NAME_PLACEHOLDER, &brick.name, 1));
                    path.is_file().then_some(MaskFile {
                        path,
                        subsample: s.subsample,
                    })
                })
                .collect(),
            MaskLocator::Convention { root, subsample } => {
                let Some(region) = brick.region else {
                    return Vec::new();
                };
                let name = &brick.name;
                let prefix = name.get(..3).unwrap_or(name);
                let path = root
                    .join(region.dir_name())
                    .join("coadd")
                    .join(prefix)
                    .join(name)
                    .join(format!("legacysurvey-{name}-maskbits.fits.gz"));
                if path.is_file() {
                    vec![MaskFile {
                        path,
                        subsample: *subsample,
                    }]
                } else {
                    Vec::new()
                }
            }
            MaskLocator::FileLists(lists) => lists
                .iter()
                .filter_map(|l| {
                    l.find(&brick.name).map(|path| MaskFile {
                        path: path.to_path_buf(),
                        subsample: l.subsample,
                    })
                })
                .collect(),
        }
    }
}
