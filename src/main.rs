use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use haloprof::config::{self, FormatKind, GlobalConfig};
use haloprof::profile::profile_catalog;
use haloprof::runtime;
use haloprof::snapshot::{HeaderCache, NpzFormat, RawFormat};
use haloprof::tree::history_catalog;

/// Halo density profiles and merger-tree histories.
///
/// Reads a catalog on stdin and writes the derived catalog to stdout.
#[derive(Parser, Debug)]
#[command(name = "haloprof", version, about)]
struct Cli {
    /// TOML config file (falls back to $HALOPROF_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// `ID Snapshot X Y Z R200m` in, radial density profiles out
    Prof {
        #[arg(long)]
        bins: Option<usize>,
        /// inner radius in units of R200m
        #[arg(long)]
        r_min_mult: Option<f64>,
        /// outer radius in units of R200m
        #[arg(long)]
        r_max_mult: Option<f64>,
    },
    /// `ID Snapshot` seeds in, main-progenitor branches out
    Tree {
        #[arg(long)]
        snap_min: Option<i64>,
        #[arg(long)]
        snap_max: Option<i64>,
    },
    /// Print a documented example config file
    ExampleConfig,
}

impl Mode {
    fn apply_overrides(&self, cfg: &mut GlobalConfig) {
        match *self {
            Mode::Prof {
                bins,
                r_min_mult,
                r_max_mult,
            } => {
                if let Some(b) = bins {
                    cfg.prof.bins = b;
                }
                if let Some(m) = r_min_mult {
                    cfg.prof.r_min_mult = m;
                }
                if let Some(m) = r_max_mult {
                    cfg.prof.r_max_mult = m;
                }
            }
            Mode::Tree { snap_min, snap_max } => {
                if let Some(s) = snap_min {
                    cfg.trees.snap_min = s;
                }
                if let Some(s) = snap_max {
                    cfg.trees.snap_max = s;
                }
            }
            Mode::ExampleConfig => {}
        }
    }
}

fn read_stdin_lines() -> Result<Vec<String>> {
    io::stdin()
        .lock()
        .lines()
        .collect::<io::Result<Vec<_>>>()
        .context("read catalog from stdin")
}

fn run_prof(lines: &[String], cfg: &GlobalConfig) -> haloprof::Result<Vec<String>> {
    cfg.validate_for_prof()?;
    let cache = HeaderCache::open(&cfg.memo.dir, &cfg.header_fingerprint())?;
    match cfg.snapshots.format {
        FormatKind::Npz => profile_catalog(lines, cfg, &cache, &NpzFormat),
        FormatKind::Raw => profile_catalog(
            lines,
            cfg,
            &cache,
            &RawFormat {
                endianness: cfg.snapshots.endianness,
            },
        ),
    }
}

fn main() -> Result<()> {
    runtime::init_logging();
    let cli = Cli::parse();
    if let Mode::ExampleConfig = cli.mode {
        print!("{}", config::EXAMPLE_CONFIG);
        return Ok(());
    }

    let config_path = config::find_config_file(cli.config.as_deref())?;
    let mut cfg = config::load_config(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    config::apply_environment_overrides(&mut cfg);
    cli.mode.apply_overrides(&mut cfg);
    info!(config = %config_path.display(), "configuration loaded");

    runtime::configure_thread_pool(cfg.runtime.threads);

    let lines = read_stdin_lines()?;
    let out = match cli.mode {
        Mode::Prof { .. } => run_prof(&lines, &cfg).context("prof")?,
        Mode::Tree { .. } => history_catalog(&lines, &cfg).context("tree")?,
        Mode::ExampleConfig => return Ok(()),
    };

    let stdout = io::stdout();
    let mut w = BufWriter::new(stdout.lock());
    for line in &out {
        writeln!(w, "{line}")?;
    }
    w.flush()?;
    Ok(())
}
