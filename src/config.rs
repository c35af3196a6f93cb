//! Run configuration.
//!
//! One `GlobalConfig` is loaded at startup and handed by reference to each
//! stage. Precedence is TOML file, then environment, then command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HaloError, Result};

pub const CONFIG_ENV: &str = "HALOPROF_CONFIG";

/// Documented starting point printed by `haloprof example-config`.
pub const EXAMPLE_CONFIG: &str = r#"# haloprof configuration

[snapshots]
# Block encoding: "npz" or "raw".
format = "npz"
# Path of one block. {snap}, {snap:03}, {block} and {block:02} are expanded.
path = "/sims/L125/snapdir_{snap:03}/block_{block}.npz"
# Inclusive range of block indices making up each snapshot.
block_min = 0
block_max = 511
# Byte order of raw blocks: "little" or "big".
# endianness = "little"

[trees]
# Directory holding the consistent-trees tree_*.dat files.
dir = "/sims/L125/trees"
# Inclusive range of snapshots kept in tree output.
# snap_min = 0
# snap_max = 9223372036854775807
# Added to the trees' Snap_num to get catalog snapshot indices.
# snap_offset = 0

[memo]
# Block header cache.
dir = "/scratch/L125/memo"

[prof]
# Number of logarithmic radial bins.
# bins = 150
# Profile radius range in units of R200m.
# r_min_mult = 0.03
# r_max_mult = 3.0

[runtime]
# Worker threads; 0 detects from the scheduler environment.
# threads = 0
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Npz,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub format: FormatKind,
    /// Block path template, e.g. `sims/snapdir_{snap:03}/block_{block}.npz`.
    pub path: String,
    pub block_min: i64,
    pub block_max: i64,
    pub endianness: Endianness,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub dir: PathBuf,
    pub snap_min: i64,
    pub snap_max: i64,
    /// Added to a tree file's `Snap_num` to get the catalog snapshot index.
    pub snap_offset: i64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            dir: PathBuf::new(),
            snap_min: 0,
            snap_max: i64::MAX,
            snap_offset: 0,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.snap_min > self.snap_max {
            return Err(HaloError::config(
                "trees.snap_min",
                format!("{} is larger than snap_max = {}", self.snap_min, self.snap_max),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, snap: i64) -> bool {
        self.snap_min <= snap && snap <= self.snap_max
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfConfig {
    /// Number of logarithmic radial bins.
    pub bins: usize,
    /// Inner profile radius in units of R200m.
    pub r_min_mult: f64,
    /// Outer profile radius in units of R200m.
    pub r_max_mult: f64,
}

impl Default for ProfConfig {
    fn default() -> Self {
        ProfConfig {
            bins: 150,
            r_min_mult: 0.03,
            r_max_mult: 3.0,
        }
    }
}

impl ProfConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bins == 0 {
            return Err(HaloError::config("prof.bins", "must be positive"));
        }
        if !(self.r_min_mult.is_finite() && self.r_min_mult > 0.0) {
            return Err(HaloError::config(
                "prof.r_min_mult",
                format!("{} is not a positive number", self.r_min_mult),
            ));
        }
        if !(self.r_max_mult.is_finite() && self.r_max_mult > 0.0) {
            return Err(HaloError::config(
                "prof.r_max_mult",
                format!("{} is not a positive number", self.r_max_mult),
            ));
        }
        if self.r_min_mult >= self.r_max_mult {
            return Err(HaloError::config(
                "prof.r_min_mult",
                format!(
                    "{} must be smaller than r_max_mult = {}",
                    self.r_min_mult, self.r_max_mult
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 0 means "detect from the environment".
    pub threads: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub snapshots: SnapshotConfig,
    pub trees: TreeConfig,
    pub memo: MemoConfig,
    pub prof: ProfConfig,
    pub runtime: RuntimeConfig,
}

impl GlobalConfig {
    /// Checks needed before a profile run touches any snapshot.
    pub fn validate_for_prof(&self) -> Result<()> {
        self.prof.validate()?;
        if self.snapshots.path.is_empty() {
            return Err(HaloError::config("snapshots.path", "not set"));
        }
        if self.snapshots.block_min > self.snapshots.block_max {
            return Err(HaloError::config(
                "snapshots.block_min",
                format!(
                    "{} is larger than block_max = {}",
                    self.snapshots.block_min, self.snapshots.block_max
                ),
            ));
        }
        if self.memo.dir.as_os_str().is_empty() {
            return Err(HaloError::config("memo.dir", "not set"));
        }
        Ok(())
    }

    pub fn validate_for_tree(&self) -> Result<()> {
        self.trees.validate()?;
        if self.trees.dir.as_os_str().is_empty() {
            return Err(HaloError::config("trees.dir", "not set"));
        }
        Ok(())
    }

    /// Identity of everything that changes what a cached block header says.
    /// Thread counts, profile binning and tree settings are deliberately left out.
    pub fn header_fingerprint(&self) -> String {
        let s = &self.snapshots;
        let canonical = format!(
            "version={}\nformat={:?}\npath={}\nblock_min={}\nblock_max={}\nendianness={:?}\n",
            env!("CARGO_PKG_VERSION"),
            s.format,
            s.path,
            s.block_min,
            s.block_max,
            s.endianness,
        );
        format!("{:016x}", fnv1a64(canonical.as_bytes()))
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, &b| (h ^ b as u64).wrapping_mul(PRIME))
}

/// Explicit path wins, then `$HALOPROF_CONFIG`.
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    match std::env::var(CONFIG_ENV) {
        Ok(p) if !p.is_empty() => Ok(PathBuf::from(p)),
        _ => Err(HaloError::config(
            "config",
            format!("no config file given; pass --config or set ${CONFIG_ENV}"),
        )),
    }
}

pub fn load_config(path: &Path) -> Result<GlobalConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, path)
}

pub fn parse_config(content: &str, path: &Path) -> Result<GlobalConfig> {
    toml::from_str(content).map_err(|source| HaloError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Supported variables: `HALOPROF_MEMO_DIR`, `HALOPROF_TREE_DIR`, `HALOPROF_THREADS`.
pub fn apply_environment_overrides(config: &mut GlobalConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

pub fn apply_overrides_from<F>(config: &mut GlobalConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("HALOPROF_MEMO_DIR").filter(|v| !v.is_empty()) {
        config.memo.dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("HALOPROF_TREE_DIR").filter(|v| !v.is_empty()) {
        config.trees.dir = PathBuf::from(v);
    }
    if let Some(n) = lookup("HALOPROF_THREADS").and_then(|v| v.parse::<usize>().ok()) {
        config.runtime.threads = n;
    }
}

/// Expands `{snap}`, `{snap:03}`, `{block}` and `{block:02}` in a path template.
/// Widths are always zero-padded.
pub fn expand_path(template: &str, snap: i64, block: i64) -> Result<PathBuf> {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let close = rest[open..].find('}').ok_or_else(|| {
            HaloError::config("snapshots.path", format!("unclosed '{{' in {template:?}"))
        })? + open;
        let field = &rest[open + 1..close];
        let (name, width) = match field.split_once(':') {
            Some((name, spec)) => {
                let width = spec.trim_start_matches('0').parse::<usize>().map_err(|_| {
                    HaloError::config("snapshots.path", format!("bad width {spec:?} in {template:?}"))
                })?;
                (name, width)
            }
            None => (field, 0),
        };
        let value = match name {
            "snap" => snap,
            "block" => block,
            other => {
                return Err(HaloError::config(
                    "snapshots.path",
                    format!("unknown placeholder {other:?} in {template:?}"),
                ));
            }
        };
        out.push_str(&format!("{value:0width$}"));
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(PathBuf::from(out))
}
