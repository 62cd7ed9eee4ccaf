//! Restoring input order and choosing the output column width.

use crate::error::{Error, Result, try_reserve};
use crate::mask::PixelType;

/// Mask codes packed into the narrowest unsigned type that holds them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskColumn {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl MaskColumn {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            MaskColumn::U8(_) => PixelType::U8,
            MaskColumn::U16(_) => PixelType::U16,
            MaskColumn::U32(_) => PixelType::U32,
            MaskColumn::U64(_) => PixelType::U64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MaskColumn::U8(v) => v.len(),
            MaskColumn::U16(v) => v.len(),
            MaskColumn::U32(v) => v.len(),
            MaskColumn::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> u64 {
        match self {
            MaskColumn::U8(v) => v[i].into(),
            MaskColumn::U16(v) => v[i].into(),
            MaskColumn::U32(v) => v[i].into(),
            MaskColumn::U64(v) => v[i],
        }
    }
}

/// Scatter values computed in sorted order back to input order:
/// the result holds `sorted[i]` at position `order[i]`.
///
/// `order` must be a permutation of `0..sorted.len()`.
pub fn restore_order<T: Copy + Default>(sorted: &[T], order: &[usize]) -> Result<Vec<T>> {
    let n = sorted.len();
    if order.len() != n {
        return Err(Error::Internal(format!(
            "{n} values but a permutation of {} entries",
            order.len()
        )));
    }

    let mut out = Vec::new();
    try_reserve(&mut out, n, "reordered values")?;
    out.resize(n, T::default());
    let mut seen = vec![false; n];
    for (&value, &dest) in sorted.iter().zip(order) {
        match seen.get_mut(dest) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(Error::Internal(format!(
                    "permutation entry {dest} repeated or out of range"
                )));
            }
        }
        out[dest] = value;
    }
    Ok(out)
}

/// Repack mask codes into the smallest width holding their maximum.
pub fn narrow_mask_type(codes: Vec<u64>) -> MaskColumn {
    let max = codes.iter().copied().max().unwrap_or(0);
    match PixelType::smallest_for(max) {
        PixelType::U8 => MaskColumn::U8(codes.into_iter().map(|c| c as u8).collect()),
        PixelType::U16 => MaskColumn::U16(codes.into_iter().map(|c| c as u16).collect()),
        PixelType::U32 => MaskColumn::U32(codes.into_iter().map(|c| c as u32).collect()),
        PixelType::U64 => MaskColumn::U64(codes),
    }
}
