//! Plain-text brick tables.
//!
//! One brick per line: `name ra_min ra_max dec_min dec_max [region]`, where
//! `region` is `N` or `S`. Blank lines and lines starting with `#` are
//! ignored.

use std::io::BufRead;
use std::path::Path;

use super::{BrickRecord, Region};
use crate::error::{Error, Result};

pub fn parse_brick_list(reader: impl BufRead, path: &Path) -> Result<Vec<BrickRecord>> {
    let mut bricks = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::read(path, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_err = |message: String| Error::Parse {
            path: path.to_path_buf(),
            line: lineno + 1,
            message,
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        if !(5..=6).contains(&fields.len()) {
            return Err(parse_err(format!(
                "expected 5 or 6 columns, found {}",
                fields.len()
            )));
        }

        let mut bounds = [0.0_f64; 4];
        for (slot, field) in bounds.iter_mut().zip(&fields[1..5]) {
            *slot = field
                .parse()
                .map_err(|_| parse_err(format!("invalid brick boundary `{field}`")))?;
        }

        let region = match fields.get(5) {
            None => None,
            Some(tag) => {
                let mut chars = tag.chars();
                match (chars.next().and_then(Region::from_tag), chars.next()) {
                    (Some(region), None) => Some(region),
                    _ => return Err(parse_err(format!("invalid photometric region `{tag}`"))),
                }
            }
        };

        bricks.push(BrickRecord {
            name: fields[0].to_string(),
            ra_min: bounds[0],
            ra_max: bounds[1],
            dec_min: bounds[2],
            dec_max: bounds[3],
            region,
        });
    }
    Ok(bricks)
}
