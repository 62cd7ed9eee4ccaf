//! Validated run configuration.

use std::path::{Path, PathBuf};

use crate::assign::AssignConfig;
use crate::catalog::ascii::AsciiFormat;
use crate::error::{Error, Result};
use crate::mask::MaskLocator;
use crate::mask::locate::{FileListSource, NAME_PLACEHOLDER, TemplateSource};

/// What to do when the output file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    #[default]
    Never,
    Force,
}

/// Where maskbit files come from. Exactly one strategy per run.
#[derive(Debug, Clone)]
pub enum MaskSource {
    /// File name templates (with `%s` for the brick name) inside `dir`, one per subsample.
    Templates { dir: PathBuf, templates: Vec<String> },
    /// Legacy Survey release tree rooted at `root`.
    Convention { root: PathBuf },
    /// Text files listing maskbit paths, one per subsample.
    Lists(Vec<PathBuf>),
    /// Glob patterns matching maskbit paths, one per subsample.
    Globs(Vec<String>),
}

impl MaskSource {
    /// Number of subsamples the strategy defines.
    pub fn subsamples(&self) -> usize {
        match self {
            MaskSource::Templates { templates, .. } => templates.len(),
            MaskSource::Convention { .. } => 1,
            MaskSource::Lists(lists) => lists.len(),
            MaskSource::Globs(patterns) => patterns.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Text brick table.
    pub brick_list: PathBuf,
    pub masks: MaskSource,
    /// Subsample id per mask source, in source order. Empty disables tagging.
    pub subsample_ids: Vec<u8>,
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: AsciiFormat,
    pub assign: AssignConfig,
    pub overwrite: Overwrite,
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::Config(format!("{what} `{}` is not a readable file", path.display())))
    }
}

impl Config {
    /// Check everything that can be checked before touching the data.
    pub fn validate(&self) -> Result<()> {
        require_file(&self.brick_list, "brick list")?;
        require_file(&self.input, "input catalog")?;
        self.format.validate()?;

        let n = self.masks.subsamples();
        if n == 0 {
            return Err(Error::Config("no maskbit source given".into()));
        }
        match &self.masks {
            MaskSource::Templates { dir, templates } => {
                if !dir.is_dir() {
                    return Err(Error::Config(format!(
                        "maskbit directory `{}` does not exist",
                        dir.display()
                    )));
                }
                if let Some(t) = templates
                    .iter()
                    .find(|t| t.matches(NAME_PLACEHOLDER).count() != 1)
                {
                    return Err(Error::Config(format!(
                        "template `{t}` must contain `{NAME_PLACEHOLDER}` exactly once"
                    )));
                }
            }
            MaskSource::Convention { root } => {
                if !root.is_dir() {
                    return Err(Error::Config(format!(
                        "maskbit root `{}` does not exist",
                        root.display()
                    )));
                }
            }
            MaskSource::Lists(lists) => {
                for list in lists {
                    require_file(list, "maskbit file list")?;
                }
            }
            MaskSource::Globs(_) => {}
        }

        if !self.subsample_ids.is_empty() && self.subsample_ids.len() != n {
            return Err(Error::Config(format!(
                "{} subsample ids given for {n} maskbit sources",
                self.subsample_ids.len()
            )));
        }

        if let Some(bit) = self.assign.xybug
            && !bit.is_power_of_two()
        {
            return Err(Error::Config(format!(
                "xybug correction needs a single bit, got {bit}"
            )));
        }

        self.check_output()
    }

    fn check_output(&self) -> Result<()> {
        let out = &self.output;
        if out == &self.input {
            return Err(Error::Config("output would overwrite the input catalog".into()));
        }
        if out.is_dir() {
            return Err(Error::Config(format!("output `{}` is a directory", out.display())));
        }
        if out.exists() && self.overwrite == Overwrite::Never {
            return Err(Error::Config(format!(
                "output `{}` exists; pass --force to overwrite it",
                out.display()
            )));
        }
        let parent = out.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = parent
            && !dir.is_dir()
        {
            return Err(Error::Config(format!(
                "output directory `{}` does not exist",
                dir.display()
            )));
        }
        Ok(())
    }

    fn subsample_id(&self, i: usize) -> Option<u8> {
        self.subsample_ids.get(i).copied()
    }

    pub fn mask_locator(&self) -> Result<MaskLocator> {
        Ok(match &self.masks {
            MaskSource::Templates { dir, templates } => MaskLocator::Templates {
                dir: dir.clone(),
                sources: templates
                    .iter()
                    .enumerate()
                    .map(|(i, t)| TemplateSource {
                        template: t.clone(),
                        subsample: self.subsample_id(i),
                    })
                    .collect(),
            },
            MaskSource::Convention { root } => MaskLocator::Convention {
                root: root.clone(),
                subsample: self.subsample_id(0),
            },
            MaskSource::Lists(lists) => MaskLocator::FileLists(
                lists
                    .iter()
                    .enumerate()
                    .map(|(i, l)| FileListSource::from_list_file(l, self.subsample_id(i)))
                    .collect::<Result<_>>()?,
            ),
            MaskSource::Globs(patterns) => MaskLocator::FileLists(
                patterns
                    .iter()
                    .enumerate()
                    .map(|(i, p)| FileListSource::from_glob(p, self.subsample_id(i)))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scratch_dir;
    use std::fs;

    fn config(dir: &Path) -> Config {
        fs::write(dir.join("bricks.txt"), "A 0 10 0 10\n").unwrap();
        fs::write(dir.join("in.txt"), "5 5\n").unwrap();
        Config {
            brick_list: dir.join("bricks.txt"),
            masks: MaskSource::Templates {
                dir: dir.to_path_buf(),
                templates: vec!["%s.fits".into()],
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
    fn accepts_valid_config() {
        let dir = scratch_dir("config_ok");
        let cfg = config(&dir);
        cfg.validate().unwrap();
        assert!(!cfg.mask_locator().unwrap().tags_subsamples());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn refuses_existing_output_unless_forced() {
        let dir = scratch_dir("config_overwrite");
        let mut cfg = config(&dir);
        fs::write(&cfg.output, "old").unwrap();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("--force"));

        cfg.overwrite = Overwrite::Force;
        cfg.validate().unwrap();

        cfg.output = cfg.input.clone();
        assert!(cfg.validate().is_err());
        cfg.output = dir.join("missing/out.txt");
        assert!(cfg.validate().is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn checks_sources_and_ids() {
        let dir = scratch_dir("config_sources");
        let mut cfg = config(&dir);

        cfg.subsample_ids = vec![1, 2];
        assert!(cfg.validate().is_err());
        cfg.subsample_ids = vec![9];
        cfg.validate().unwrap();
        let locator = cfg.mask_locator().unwrap();
        assert!(locator.tags_subsamples());

        cfg.masks = MaskSource::Templates {
            dir: dir.clone(),
            templates: vec!["mask.fits".into()],
        };
        assert!(cfg.validate().is_err());

        cfg.masks = MaskSource::Templates {
            dir: dir.clone(),
            templates: Vec::new(),
        };
        assert!(cfg.validate().is_err());

        cfg.masks = MaskSource::Convention {
            root: dir.join("nowhere"),
        };
        assert!(cfg.validate().is_err());

        cfg.masks = MaskSource::Lists(vec![dir.join("nolist.txt")]);
        assert!(cfg.validate().is_err());

        cfg.masks = MaskSource::Globs(vec![format!("{}/*.fits", dir.display())]);
        cfg.validate().unwrap();
        assert!(matches!(cfg.mask_locator().unwrap(), MaskLocator::FileLists(_)));

        cfg.assign.xybug = Some(12);
        assert!(cfg.validate().is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_inputs_are_config_errors() {
        let dir = scratch_dir("config_missing");
        let mut cfg = config(&dir);
        cfg.input = dir.join("absent.txt");
        assert_eq!(cfg.validate().unwrap_err().exit_code(), 4);
        fs::remove_dir_all(&dir).unwrap();
    }
}
