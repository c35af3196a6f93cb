//! Block-level access to particle snapshots.
//!
//! Every on-disk encoding implements [`SnapshotFormat`]. The encoding is
//! picked once in `main` and passed down as a type parameter, so nothing
//! below this module ever inspects which format it is talking to.

use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{SnapshotConfig, expand_path};
use crate::error::{HaloError, Result};
use crate::geom::BlockRegion;

pub mod memo;
pub mod npz;
pub mod raw;

pub use memo::{CachedHeaders, HeaderCache};
pub use npz::NpzFormat;
pub use raw::RawFormat;

/// What a format can say about a block without reading its particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMeta {
    pub region: BlockRegion,
    pub n_particles: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    pub index: i64,
    pub path: PathBuf,
    pub region: BlockRegion,
    pub n_particles: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleBlock {
    pub positions: Vec<[f32; 3]>,
    pub masses: Vec<f32>,
}

impl ParticleBlock {
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

pub trait SnapshotFormat: Sync {
    type Handle;

    fn name(&self) -> &'static str;

    fn read_header(&self, path: &Path) -> io::Result<BlockMeta>;

    fn open(&self, path: &Path) -> io::Result<Self::Handle>;

    fn read(&self, handle: &mut Self::Handle) -> io::Result<ParticleBlock>;

    /// Releases whatever `open` acquired.
    fn close(&self, handle: Self::Handle);
}

/// Source of block headers for one snapshot at a time.
pub trait HeaderProvider {
    fn headers(&self, snap: i64) -> Result<Vec<BlockHeader>>;
}

pub(crate) fn invalid_data(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// Reads every block header of one snapshot straight from disk.
pub fn read_block_headers<F: SnapshotFormat>(
    format: &F,
    cfg: &SnapshotConfig,
    snap: i64,
) -> Result<Vec<BlockHeader>> {
    let header_err = |reason: String| HaloError::SnapshotHeader { snap, reason };
    let indices: Vec<i64> = (cfg.block_min..=cfg.block_max).collect();
    indices
        .par_iter()
        .map(|&index| -> Result<BlockHeader> {
            let path = expand_path(&cfg.path, snap, index)?;
            let meta = format
                .read_header(&path)
                .map_err(|e| header_err(format!("{}: {e}", path.display())))?;
            Ok(BlockHeader {
                index,
                path,
                region: meta.region,
                n_particles: meta.n_particles,
            })
        })
        .collect()
}

/// open -> read -> close for one block.
pub fn read_block<F: SnapshotFormat>(
    format: &F,
    header: &BlockHeader,
    snap: i64,
) -> Result<ParticleBlock> {
    let block_err = |e: io::Error| HaloError::BlockRead {
        snap,
        path: header.path.clone(),
        reason: e.to_string(),
    };
    let mut handle = format.open(&header.path).map_err(block_err)?;
    let block = format.read(&mut handle);
    format.close(handle);
    let block = block.map_err(block_err)?;
    if block.positions.len() != block.masses.len() {
        return Err(HaloError::BlockRead {
            snap,
            path: header.path.clone(),
            reason: format!(
                "{} positions but {} masses",
                block.positions.len(),
                block.masses.len()
            ),
        });
    }
    Ok(block)
}
