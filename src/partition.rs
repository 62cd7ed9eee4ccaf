//! Brick-aligned work segments.
//!
//! A segment is a contiguous run of brick groups, so every object belongs
//! to exactly one segment and no brick is shared between workers.

use std::ops::Range;

use crate::error::{Error, Result, try_reserve};
use crate::grouping::BrickGroup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Indices into the group list.
    pub groups: Range<usize>,
    /// Indices into the sorted object arrays.
    pub objects: Range<usize>,
}

/// Split `groups` into at most `workers` segments with balanced brick
/// counts. The first `len % workers` segments take one extra brick.
pub fn split(groups: &[BrickGroup], workers: usize) -> Vec<Segment> {
    if groups.is_empty() {
        return Vec::new();
    }
    let n = workers.clamp(1, groups.len());
    let per = groups.len() / n;
    let extra = groups.len() % n;

    let mut segments = Vec::with_capacity(n);
    let mut start = 0;
    for k in 0..n {
        let end = start + per + usize::from(k < extra);
        segments.push(Segment {
            groups: start..end,
            objects: groups[start].objects.start..groups[end - 1].objects.end,
        });
        start = end;
    }
    segments
}

/// Concatenate per-segment outputs in segment order, undoing [`split`].
pub fn gather<T>(parts: Vec<Vec<T>>, expected: usize) -> Result<Vec<T>> {
    let total: usize = parts.iter().map(Vec::len).sum();
    if total != expected {
        return Err(Error::Internal(format!(
            "gathered {total} values from {} segments, expected {expected}",
            parts.len()
        )));
    }
    let mut out = Vec::new();
    try_reserve(&mut out, expected, "gathered results")?;
    for part in parts {
        out.extend(part);
    }
    Ok(out)
}
