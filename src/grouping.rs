//! Brick assignment and grouping of catalog objects.

use std::ops::Range;

use rayon::prelude::*;

use crate::bricks::BrickIndex;
use crate::catalog::Catalog;
use crate::error::{Error, Result};

/// A run of consecutive sorted objects sharing one brick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrickGroup {
    pub brick: usize,
    pub objects: Range<usize>,
}

/// Catalog coordinates sorted by brick id.
///
/// `order[i]` is the input position of sorted object `i`.
#[derive(Debug, Clone)]
pub struct GroupedCatalog {
    pub ra: Vec<f64>,
    pub dec: Vec<f64>,
    pub order: Vec<usize>,
    pub groups: Vec<BrickGroup>,
}

impl GroupedCatalog {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Resolve the brick of every object and sort the coordinates so that each
/// brick's objects are contiguous.
///
/// Fails on the first coordinate outside the brick table.
pub fn assign_and_group<P: Sync>(index: &BrickIndex, catalog: &Catalog<P>) -> Result<GroupedCatalog> {
    let brick_ids: Vec<usize> = catalog
        .ra()
        .par_iter()
        .zip(catalog.dec().par_iter())
        .map(|(&ra, &dec)| index.find(ra, dec).ok_or(Error::BrickNotFound { ra, dec }))
        .collect::<Result<_>>()?;

    let mut order: Vec<usize> = (0..catalog.len()).collect();
    order.par_sort_unstable_by_key(|&i| (brick_ids[i], i));

    let ra = order.iter().map(|&i| catalog.ra()[i]).collect();
    let dec = order.iter().map(|&i| catalog.dec()[i]).collect();

    let mut groups: Vec<BrickGroup> = Vec::new();
    for (pos, &i) in order.iter().enumerate() {
        let brick = brick_ids[i];
        match groups.last_mut() {
            Some(g) if g.brick == brick => g.objects.end = pos + 1,
            _ => groups.push(BrickGroup {
                brick,
                objects: pos..pos + 1,
            }),
        }
    }

    log::info!(
        "{} objects fall in {} bricks",
        catalog.len(),
        groups.len()
    );

    Ok(GroupedCatalog {
        ra,
        dec,
        order,
        groups,
    })
}
