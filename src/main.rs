use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use env_logger::Env;

use brickmask::Error;
use brickmask::error::Category;
use brickmask::assign::{AssignConfig, SubsampleTag, Validity};
use brickmask::catalog::ascii::AsciiFormat;
use brickmask::config::{Config, MaskSource, Overwrite};
use brickmask::pipeline;

/// Bit re-read at truncated pixel indices in eBOSS masks.
const EBOSS_XYBUG_BIT: u64 = 4;

#[derive(Parser)]
#[command(
    name = "brickmask",
    version,
    about = "Assign Legacy Survey brick maskbit codes to catalog objects"
)]
struct Cli {
    /// Brick table, one `name ra_min ra_max dec_min dec_max [N|S]` per line.
    #[arg(short, long)]
    bricks: PathBuf,

    /// Input catalog (whitespace-separated text).
    #[arg(short, long)]
    input: PathBuf,

    /// Output catalog. Mask codes (and subsample ids) are appended to each row.
    #[arg(short, long)]
    output: PathBuf,

    /// Directory holding maskbit files named by --mask-template.
    #[arg(long)]
    mask_dir: Option<PathBuf>,

    /// Maskbit file name with `%s` for the brick name. Repeat per subsample.
    #[arg(long)]
    mask_template: Vec<String>,

    /// Legacy Survey release root (`<root>/<north|south>/coadd/...`).
    #[arg(long)]
    mask_root: Option<PathBuf>,

    /// Text file listing maskbit files. Repeat per subsample.
    #[arg(long)]
    mask_list: Vec<PathBuf>,

    /// Glob pattern matching maskbit files. Repeat per subsample.
    #[arg(long)]
    mask_glob: Vec<String>,

    /// Subsample id per mask source, in order. Adds a subsample column.
    #[arg(long)]
    subsample_id: Vec<u8>,

    /// Code for objects in bricks without maskbit files [default: 1, 0 with --legacy-eboss].
    #[arg(long)]
    mask_null: Option<u64>,

    /// Which pixel values are accumulated [default: all, lowest-bit with --legacy-eboss].
    #[arg(long, value_enum)]
    validity: Option<ValidityArg>,

    /// Re-read this bit at truncated pixel indices [default: off, 4 with --legacy-eboss].
    #[arg(long)]
    xybug: Option<u64>,

    /// When objects get the subsample id [default: unless-null, always with --legacy-eboss].
    #[arg(long, value_enum)]
    tag: Option<TagArg>,

    /// Settings for eBOSS-era maskbit files.
    #[arg(long)]
    legacy_eboss: bool,

    /// Comment character of the input catalog.
    #[arg(long, default_value = "#")]
    comment: char,

    /// 1-based column of the right ascension.
    #[arg(long, default_value = "1")]
    ra_col: usize,

    /// 1-based column of the declination.
    #[arg(long, default_value = "2")]
    dec_col: usize,

    /// 1-based columns copied to the output (comma-separated). Default: whole rows.
    #[arg(long, value_delimiter = ',')]
    output_col: Vec<usize>,

    /// Overwrite an existing output file.
    #[arg(short, long)]
    force: bool,

    /// Decode unscaled primary-HDU pixels directly from the file bytes.
    #[arg(long)]
    fast_read: bool,

    /// Worker threads (default: all cores).
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Log per-file details.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ValidityArg {
    All,
    LowestBit,
}

#[derive(Clone, Copy, ValueEnum)]
enum TagArg {
    UnlessNull,
    Always,
}

impl Cli {
    fn mask_source(&self) -> Result<MaskSource, Error> {
        let mut chosen = Vec::new();
        if let Some(dir) = &self.mask_dir {
            chosen.push(MaskSource::Templates {
                dir: dir.clone(),
                templates: self.mask_template.clone(),
            });
        } else if !self.mask_template.is_empty() {
            return Err(Error::Config("--mask-template requires --mask-dir".into()));
        }
        if let Some(root) = &self.mask_root {
            chosen.push(MaskSource::Convention { root: root.clone() });
        }
        if !self.mask_list.is_empty() {
            chosen.push(MaskSource::Lists(self.mask_list.clone()));
        }
        if !self.mask_glob.is_empty() {
            chosen.push(MaskSource::Globs(self.mask_glob.clone()));
        }

        match chosen.len() {
            1 => Ok(chosen.remove(0)),
            0 => Err(Error::Config(
                "one of --mask-dir, --mask-root, --mask-list or --mask-glob is required".into(),
            )),
            _ => Err(Error::Config(
                "--mask-dir, --mask-root, --mask-list and --mask-glob are mutually exclusive"
                    .into(),
            )),
        }
    }

    fn into_config(self) -> Result<Config, Error> {
        let masks = self.mask_source()?;
        let legacy = self.legacy_eboss;

        let validity = match self.validity {
            Some(ValidityArg::All) => Validity::All,
            Some(ValidityArg::LowestBit) => Validity::LowestBit,
            None if legacy => Validity::LowestBit,
            None => Validity::All,
        };
        let tagging = match self.tag {
            Some(TagArg::UnlessNull) => SubsampleTag::UnlessNull,
            Some(TagArg::Always) => SubsampleTag::Always,
            None if legacy => SubsampleTag::Always,
            None => SubsampleTag::UnlessNull,
        };

        Ok(Config {
            brick_list: self.bricks,
            masks,
            subsample_ids: self.subsample_id,
            input: self.input,
            output: self.output,
            format: AsciiFormat {
                comment: Some(self.comment),
                ra_column: self.ra_col,
                dec_column: self.dec_col,
                payload_columns: (!self.output_col.is_empty()).then_some(self.output_col),
            },
            assign: AssignConfig {
                null_code: self.mask_null.unwrap_or(if legacy { 0 } else { 1 }),
                validity,
                xybug: self.xybug.or(legacy.then_some(EBOSS_XYBUG_BIT)),
                tagging,
                fast_read: self.fast_read,
                segments: 0,
            },
            overwrite: if self.force {
                Overwrite::Force
            } else {
                Overwrite::Never
            },
        })
    }
}

fn fail(err: Error) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err.exit_code())
}

/// Usage errors share the configuration exit code; clap's own code 2 would
/// collide with brick table failures. `--help` and `--version` exit 0.
fn usage_exit_code(e: &clap::Error) -> u8 {
    if e.use_stderr() { Category::Config.exit_code() } else { 0 }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(&e));
        }
    };

    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(if cli.verbose {
            "debug"
        } else {
            "info"
        }));
    builder.format_timestamp_secs();
    builder.init();

    if let Some(n) = cli.threads
        && let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global()
    {
        return fail(Error::Config(format!("cannot start {n} worker threads: {e}")));
    }

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => return fail(e),
    };

    match pipeline::run(&config) {
        Ok(summary) => {
            log::info!(
                "assigned mask codes to {} objects in {} bricks",
                summary.objects,
                summary.bricks
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}
