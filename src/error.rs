use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal failure categories. Each maps to its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Memory,
    Brick,
    File,
    Config,
    Mask,
    Save,
    Internal,
}

impl Category {
    pub fn exit_code(self) -> u8 {
        match self {
            Category::Memory => 1,
            Category::Brick => 2,
            Category::File => 3,
            Category::Config => 4,
            Category::Mask => 6,
            Category::Save => 12,
            Category::Internal => 99,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to allocate memory for {what}: {source}")]
    Memory {
        what: &'static str,
        #[source]
        source: TryReserveError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid brick table: {0}")]
    BrickTable(String),

    #[error("no brick contains the coordinate (RA = {ra}, Dec = {dec})")]
    BrickNotFound { ra: f64, dec: f64 },

    #[error("maskbit file `{}`: {message}", path.display())]
    Mask { path: PathBuf, message: String },

    #[error("maskbit file `{}`: the CD matrix is not invertible", path.display())]
    SingularWcs { path: PathBuf },

    #[error(
        "maskbit file `{}`: coordinate (RA = {ra}, Dec = {dec}) maps to pixel ({x}, {y}) outside the {width} x {height} image",
        path.display()
    )]
    PixelOutOfBounds {
        path: PathBuf,
        ra: f64,
        dec: f64,
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },

    #[error("cannot write `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Error::Memory { .. } => Category::Memory,
            Error::Config(_) => Category::Config,
            Error::Read { .. } | Error::Parse { .. } => Category::File,
            Error::BrickTable(_) | Error::BrickNotFound { .. } => Category::Brick,
            Error::Mask { .. } | Error::SingularWcs { .. } | Error::PixelOutOfBounds { .. } => {
                Category::Mask
            }
            Error::Write { .. } => Category::Save,
            Error::Internal(_) => Category::Internal,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.category().exit_code()
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Write {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn mask(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Mask {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Reserve room for `additional` elements, reporting allocation failure as an [`Error`].
pub(crate) fn try_reserve<T>(buf: &mut Vec<T>, additional: usize, what: &'static str) -> Result<()> {
    buf.try_reserve(additional)
        .map_err(|source| Error::Memory { what, source })
}
