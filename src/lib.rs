//! Maskbit assignment for sky catalogs.
//!
//! Brickmask looks up, for every object of a catalog, the Legacy Survey
//! brick containing it, projects the object onto the brick's maskbit image
//! with the image's TAN WCS, and accumulates the pixel values into a
//! per-object mask code.

pub mod assign;
pub mod bricks;
pub mod catalog;
pub mod config;
pub mod emit;
pub mod error;
pub mod geom;
pub mod grouping;
pub mod mask;
pub mod partition;
pub mod pipeline;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
