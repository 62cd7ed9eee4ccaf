//! Accumulating maskbit codes for grouped objects.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use rayon::prelude::*;

use crate::bricks::BrickIndex;
use crate::error::{Error, Result, try_reserve};
use crate::geom::TanWcs;
use crate::grouping::GroupedCatalog;
use crate::mask::{MaskLocator, MaskPixels, MaskReader, MaskWord, PixelType};
use crate::partition::{self, Segment};

/// Which pixel values contribute to an object's mask code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validity {
    /// Every value is added.
    #[default]
    All,
    /// Only values with the lowest bit set are added (eBOSS masks).
    LowestBit,
}

impl Validity {
    pub fn accepts(self, value: u64) -> bool {
        match self {
            Validity::All => true,
            Validity::LowestBit => value & 1 != 0,
        }
    }
}

/// When a covered object receives the subsample id of a mask file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsampleTag {
    /// Only if the pixel value shares no bit with the null code.
    #[default]
    UnlessNull,
    /// Whenever the pixel value passes validity filtering.
    Always,
}

impl SubsampleTag {
    fn applies(self, value: u64, null_code: u64) -> bool {
        match self {
            SubsampleTag::UnlessNull => value & null_code == 0,
            SubsampleTag::Always => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssignConfig {
    /// Code given to objects in bricks without any maskbit file.
    pub null_code: u64,
    pub validity: Validity,
    /// Bit whose value is re-read at the truncated rather than the rounded
    /// pixel index. eBOSS masks need `Some(4)`.
    pub xybug: Option<u64>,
    pub tagging: SubsampleTag,
    /// Decode uncompressed-layout pixels straight from the file bytes.
    pub fast_read: bool,
    /// Number of work segments. Zero uses four per rayon thread.
    pub segments: usize,
}

impl Default for AssignConfig {
    fn default() -> Self {
        Self {
            null_code: 1,
            validity: Validity::All,
            xybug: None,
            tagging: SubsampleTag::UnlessNull,
            fast_read: false,
            segments: 0,
        }
    }
}

/// Mask codes of a grouped catalog, in sorted order.
#[derive(Debug, Clone)]
pub struct MaskAssignment {
    pub mask: Vec<u64>,
    /// Present when the mask files carry subsample ids.
    pub subsample: Option<Vec<u8>>,
    /// Widest pixel type among the files read.
    pub pixel_type: Option<PixelType>,
    /// Bricks that had no maskbit file and got the null code.
    pub null_bricks: usize,
}

impl MaskAssignment {
    /// Width able to hold any pixel read, and the null code when it was used.
    pub fn storage_type(&self, null_code: u64) -> PixelType {
        let null = (self.null_bricks > 0).then(|| PixelType::smallest_for(null_code));
        self.pixel_type.max(null).unwrap_or(PixelType::U8)
    }
}

#[derive(Debug, Default)]
struct SegmentResult {
    mask: Vec<u64>,
    subsample: Vec<u8>,
    pixel_type: Option<PixelType>,
    null_bricks: usize,
}

/// Logs assignment progress roughly every tenth of the bricks.
struct Progress {
    done: AtomicUsize,
    total: usize,
    step: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
            step: total.div_ceil(10).max(1),
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.step == 0 || done == self.total {
            log::info!("processed {done} / {} bricks", self.total);
        }
    }
}

/// Assign mask codes to every object of `grouped`.
///
/// Bricks are processed in parallel, each object is written by exactly one
/// worker. Any unreadable or inconsistent maskbit file aborts the run.
pub fn assign_masks(
    grouped: &GroupedCatalog,
    bricks: &BrickIndex,
    locator: &MaskLocator,
    config: &AssignConfig,
) -> Result<MaskAssignment> {
    if let Some(bit) = config.xybug
        && !bit.is_power_of_two()
    {
        return Err(Error::Config(format!(
            "xybug correction needs a single bit, got {bit}"
        )));
    }

    let workers = match config.segments {
        0 => rayon::current_num_threads() * 4,
        n => n,
    };
    let segments = partition::split(&grouped.groups, workers);
    let tagging = locator.tags_subsamples();
    let progress = Progress::new(grouped.groups.len());
    log::debug!(
        "{} bricks split into {} segments",
        grouped.groups.len(),
        segments.len()
    );

    let results = segments
        .par_iter()
        .map_init(
            || MaskReader::new(config.fast_read),
            |reader, segment| {
                process_segment(reader, segment, grouped, bricks, locator, config, tagging, &progress)
            },
        )
        .collect::<Result<Vec<_>>>()?;

    let pixel_type = results.iter().filter_map(|r| r.pixel_type).max();
    let null_bricks = results.iter().map(|r| r.null_bricks).sum();
    let (masks, subsamples): (Vec<_>, Vec<_>) =
        results.into_iter().map(|r| (r.mask, r.subsample)).unzip();

    let mask = partition::gather(masks, grouped.len())?;
    let subsample = if tagging {
        Some(partition::gather(subsamples, grouped.len())?)
    } else {
        None
    };

    Ok(MaskAssignment {
        mask,
        subsample,
        pixel_type,
        null_bricks,
    })
}

#[allow(clippy::too_many_arguments)]
fn process_segment(
    reader: &mut MaskReader,
    segment: &Segment,
    grouped: &GroupedCatalog,
    bricks: &BrickIndex,
    locator: &MaskLocator,
    config: &AssignConfig,
    tagging: bool,
    progress: &Progress,
) -> Result<SegmentResult> {
    let n = segment.objects.len();
    let offset = segment.objects.start;

    let mut out = SegmentResult::default();
    try_reserve(&mut out.mask, n, "mask codes")?;
    out.mask.resize(n, 0);
    if tagging {
        try_reserve(&mut out.subsample, n, "subsample ids")?;
        out.subsample.resize(n, 0);
    }

    for group in &grouped.groups[segment.groups.clone()] {
        let brick = bricks.get(group.brick);
        let local = group.objects.start - offset..group.objects.end - offset;
        let files = locator.resolve(brick);

        if files.is_empty() {
            log::debug!("brick {}: no maskbit file", brick.name);
            out.mask[local].fill(config.null_code);
            out.null_bricks += 1;
            progress.tick();
            continue;
        }

        for file in &files {
            let image = reader.read(&file.path)?;
            out.pixel_type = out.pixel_type.max(Some(image.pixel_type()));

            let mut job = PixelJob {
                path: &file.path,
                wcs: &image.wcs,
                ra: &grouped.ra[group.objects.clone()],
                dec: &grouped.dec[group.objects.clone()],
                mask: &mut out.mask[local.clone()],
                subsample: if tagging {
                    Some(&mut out.subsample[local.clone()])
                } else {
                    None
                },
                subsample_id: file.subsample,
                config,
            };
            match &image.pixels {
                MaskPixels::U8(px) => job.accumulate(px)?,
                MaskPixels::U16(px) => job.accumulate(px)?,
                MaskPixels::U32(px) => job.accumulate(px)?,
                MaskPixels::U64(px) => job.accumulate(px)?,
            }
            reader.recycle(image);
        }
        progress.tick();
    }
    Ok(out)
}

/// The objects of one brick against one maskbit image.
struct PixelJob<'a> {
    path: &'a Path,
    wcs: &'a TanWcs,
    ra: &'a [f64],
    dec: &'a [f64],
    mask: &'a mut [u64],
    subsample: Option<&'a mut [u8]>,
    subsample_id: Option<u8>,
    config: &'a AssignConfig,
}

impl PixelJob<'_> {
    fn accumulate<T: MaskWord>(&mut self, pixels: &Array2<T>) -> Result<()> {
        let (height, width) = pixels.dim();
        let config = self.config;

        for k in 0..self.ra.len() {
            let (ra, dec) = (self.ra[k], self.dec[k]);
            let pixel_at = |x: f64, y: f64| -> Result<u64> {
                let (ix, iy) = (x as i64, y as i64);
                if ix < 0 || iy < 0 || ix as usize >= width || iy as usize >= height {
                    return Err(Error::PixelOutOfBounds {
                        path: self.path.to_path_buf(),
                        ra,
                        dec,
                        x: ix,
                        y: iy,
                        width,
                        height,
                    });
                }
                Ok(pixels[[iy as usize, ix as usize]].into())
            };

            let (x, y) = self.wcs.world_to_pixel(ra, dec);
            let value = pixel_at(x.round(), y.round())?;
            if !config.validity.accepts(value) {
                continue;
            }

            self.mask[k] += match config.xybug {
                // The flagged bit was rasterized with truncated indices.
                Some(bit) => value - (value & bit) + (pixel_at(x.trunc(), y.trunc())? & bit),
                None => value,
            };

            if let (Some(ids), Some(id)) = (self.subsample.as_deref_mut(), self.subsample_id)
                && config.tagging.applies(value, config.null_code)
            {
                ids[k] = id;
            }
        }
        Ok(())
    }
}
