//! End-to-end run: bricks and catalog in, masked catalog out.

use std::time::Instant;

use crate::assign::assign_masks;
use crate::bricks::{BrickIndex, read_brick_table};
use crate::catalog::ascii::{read_ascii, write_ascii};
use crate::config::Config;
use crate::emit::{narrow_mask_type, restore_order};
use crate::error::Result;
use crate::grouping::assign_and_group;
use crate::mask::PixelType;

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub objects: usize,
    /// Bricks holding at least one object.
    pub bricks: usize,
    /// Bricks without any maskbit file.
    pub null_bricks: usize,
    /// Widest maskbit pixel type read, if any file was read.
    pub pixel_type: Option<PixelType>,
    /// Width of the emitted mask column.
    pub output_type: PixelType,
}

pub fn run(config: &Config) -> Result<Summary> {
    let start = Instant::now();
    config.validate()?;
    let locator = config.mask_locator()?;

    let index = BrickIndex::build(read_brick_table(&config.brick_list)?)?;
    log::info!(
        "loaded {} bricks from {}",
        index.len(),
        config.brick_list.display()
    );

    let catalog = read_ascii(&config.input, &config.format)?;
    log::info!(
        "read {} objects from {}",
        catalog.len(),
        config.input.display()
    );
    if catalog.is_empty() {
        log::warn!("input catalog is empty");
    }

    let grouped = assign_and_group(&index, &catalog)?;
    let assignment = assign_masks(&grouped, &index, &locator, &config.assign)?;
    if assignment.null_bricks > 0 {
        log::info!(
            "{} of {} bricks have no maskbit file",
            assignment.null_bricks,
            grouped.groups.len()
        );
    }

    let mask = restore_order(&assignment.mask, &grouped.order)?;
    let subsample = assignment
        .subsample
        .as_deref()
        .map(|ids| restore_order(ids, &grouped.order))
        .transpose()?;
    let column = narrow_mask_type(mask);
    log::info!(
        "mask codes stored as {} (pixels up to {})",
        column.pixel_type(),
        assignment.storage_type(config.assign.null_code)
    );

    write_ascii(&config.output, catalog.payloads(), &column, subsample.as_deref())?;
    log::info!(
        "wrote {} in {:.2}s",
        config.output.display(),
        start.elapsed().as_secs_f64()
    );

    Ok(Summary {
        objects: catalog.len(),
        bricks: grouped.groups.len(),
        null_bricks: assignment.null_bricks,
        pixel_type: assignment.pixel_type,
        output_type: column.pixel_type(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::{AssignConfig, SubsampleTag, Validity};
    use crate::catalog::ascii::AsciiFormat;
    use crate::config::{MaskSource, Overwrite};
    use crate::error::Error;
    use crate::test_utils::{BrickTableFixture, MaskFixture, scratch_dir};
    use std::fs;
    use std::path::Path;

    fn two_brick_setup(dir: &Path) -> Config {
        fs::write(
            dir.join("bricks.txt"),
            "# name ra1 ra2 dec1 dec2\nA 0 10 0 10\nB 10 20 0 10\n",
        )
        .unwrap();
        MaskFixture::centred([5.0, 5.0], 11, 1.0)
            .fill(2)
            .gzip()
            .write(&dir.join("mask-A.fits.gz"));
        Config {
            brick_list: dir.join("bricks.txt"),
            masks: MaskSource::Templates {
                dir: dir.to_path_buf(),
                templates: vec!["mask-%s.fits.gz".into()],
            },
            subsample_ids: Vec::new(),
            input: dir.join("in.txt"),
            output: dir.join("out.txt"),
            format: AsciiFormat::default(),
            assign: AssignConfig::default(),
            overwrite: Overwrite::Never,
        }
    }

    #[test]
    fn masks_catalog_in_input_order() {
        let dir = scratch_dir("pipeline_basic");
        let cfg = two_brick_setup(&dir);
        fs::write(&cfg.input, "# ra dec id\n15 5 first\n5 5 second\n12 1 third\n").unwrap();

        let summary = run(&cfg).unwrap();
        assert_eq!(
            summary,
            Summary {
                objects: 3,
                bricks: 2,
                null_bricks: 1,
                pixel_type: Some(PixelType::U8),
                output_type: PixelType::U8,
            }
        );
        assert_eq!(
            fs::read_to_string(&cfg.output).unwrap(),
            "15 5 first 1\n5 5 second 2\n12 1 third 1\n"
        );

        // A second run must not clobber the result without --force.
        assert_eq!(run(&cfg).unwrap_err().exit_code(), 4);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn subsample_column_and_wide_codes() {
        let dir = scratch_dir("pipeline_subsample");
        let mut cfg = two_brick_setup(&dir);
        MaskFixture::centred([15.0, 5.0], 11, 1.0)
            .bitpix(32)
            .fill(70000)
            .write(&dir.join("mask-B.fits.gz"));
        cfg.subsample_ids = vec![3];
        cfg.format.payload_columns = Some(vec![3]);
        fs::write(&cfg.input, "5 5 a\n15 5 b\n").unwrap();

        let summary = run(&cfg).unwrap();
        assert_eq!(summary.output_type, PixelType::U32);
        assert_eq!(summary.pixel_type, Some(PixelType::U32));
        assert_eq!(fs::read_to_string(&cfg.output).unwrap(), "a 2 3\nb 70000 3\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn legacy_settings() {
        let dir = scratch_dir("pipeline_legacy");
        let mut cfg = two_brick_setup(&dir);
        cfg.assign = AssignConfig {
            null_code: 0,
            validity: Validity::LowestBit,
            xybug: Some(4),
            tagging: SubsampleTag::Always,
            ..AssignConfig::default()
        };
        fs::write(&cfg.input, "5 5\n15 5\n").unwrap();
        run(&cfg).unwrap();
        assert_eq!(fs::read_to_string(&cfg.output).unwrap(), "5 5 0\n15 5 0\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn survey_bricks_fits_table() {
        let dir = scratch_dir("pipeline_fits_bricks");
        let mut cfg = two_brick_setup(&dir);
        cfg.brick_list = dir.join("survey-bricks.fits.gz");
        BrickTableFixture::new()
            .row("A", [0.0, 10.0, 0.0, 10.0], 'S')
            .row("B", [10.0, 20.0, 0.0, 10.0], 'N')
            .gzip()
            .write(&cfg.brick_list);
        fs::write(&cfg.input, "15 5
5 5
").unwrap();

        let summary = run(&cfg).unwrap();
        assert_eq!(summary.bricks, 2);
        assert_eq!(fs::read_to_string(&cfg.output).unwrap(), "15 5 1
5 5 2
");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failure_leaves_no_output() {
        let dir = scratch_dir("pipeline_fail");
        let cfg = two_brick_setup(&dir);
        fs::write(&cfg.input, "5 5\n25 5\n").unwrap();

        let err = run(&cfg).unwrap_err();
        assert!(matches!(err, Error::BrickNotFound { .. }));
        assert_eq!(err.exit_code(), 2);
        assert!(!cfg.output.exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
