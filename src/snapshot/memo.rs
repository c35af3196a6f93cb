//! On-disk cache of block headers, one npz per snapshot.
//!
//! The cache directory carries a `memo.fingerprint` file. It is checked once
//! when the cache is opened; if it does not match the current snapshot
//! settings every cached header file is dropped and rebuilt on demand.

use ndarray::{Array1, Array2};
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{BlockHeader, HeaderProvider, SnapshotFormat, invalid_data, read_block_headers};
use crate::config::{SnapshotConfig, expand_path};
use crate::error::{HaloError, Result};
use crate::geom::BlockRegion;

const FINGERPRINT_FILE: &str = "memo.fingerprint";
const HEADER_PREFIX: &str = "hd_snap";

#[derive(Debug, Clone)]
pub struct HeaderCache {
    dir: PathBuf,
}

impl HeaderCache {
    pub fn open(dir: &Path, fingerprint: &str) -> Result<Self> {
        let cache_err = |e: io::Error| HaloError::MemoCache {
            dir: dir.to_path_buf(),
            reason: e.to_string(),
        };
        fs::create_dir_all(dir).map_err(cache_err)?;

        let fp_path = dir.join(FINGERPRINT_FILE);
        let stored = fs::read_to_string(&fp_path).ok();
        match stored.as_deref().map(str::trim) {
            Some(fp) if fp == fingerprint => {
                debug!(dir = %dir.display(), "header cache fingerprint matches");
            }
            Some(fp) => {
                warn!(
                    dir = %dir.display(),
                    stored = fp,
                    current = fingerprint,
                    "snapshot settings changed since the header cache was built; invalidating"
                );
                let removed = clear_headers(dir).map_err(cache_err)?;
                info!(removed, "dropped cached header files");
                fs::write(&fp_path, format!("{fingerprint}\n")).map_err(cache_err)?;
            }
            None => {
                // unknown provenance, so anything already here is suspect
                clear_headers(dir).map_err(cache_err)?;
                fs::write(&fp_path, format!("{fingerprint}\n")).map_err(cache_err)?;
            }
        }
        Ok(HeaderCache {
            dir: dir.to_path_buf(),
        })
    }

    fn header_path(&self, snap: i64) -> PathBuf {
        self.dir.join(format!("{HEADER_PREFIX}{snap}.npz"))
    }

    /// Headers for every block of `snap`, from the cache when possible.
    pub fn headers<F: SnapshotFormat>(
        &self,
        format: &F,
        cfg: &SnapshotConfig,
        snap: i64,
    ) -> Result<Vec<BlockHeader>> {
        let path = self.header_path(snap);
        if path.exists() {
            match load_headers(&path, cfg, snap) {
                Ok(hds) => return Ok(hds),
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable header cache; rebuilding"),
            }
        }

        debug!(snap, format = format.name(), "reading block headers from disk");
        let hds = read_block_headers(format, cfg, snap)?;
        save_headers(&path, &hds).map_err(|e| HaloError::MemoCache {
            dir: self.dir.clone(),
            reason: format!("writing {}: {e}", path.display()),
        })?;
        Ok(hds)
    }
}

/// A cache bound to one format and snapshot layout.
pub struct CachedHeaders<'a, F> {
    pub cache: &'a HeaderCache,
    pub format: &'a F,
    pub cfg: &'a SnapshotConfig,
}

impl<F: SnapshotFormat> HeaderProvider for CachedHeaders<'_, F> {
    fn headers(&self, snap: i64) -> Result<Vec<BlockHeader>> {
        self.cache.headers(self.format, self.cfg, snap)
    }
}

fn clear_headers(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(HEADER_PREFIX) && name.ends_with(".npz") {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn rows3(hds: &[BlockHeader], f: impl Fn(&BlockRegion) -> [f64; 3]) -> io::Result<Array2<f64>> {
    let flat: Vec<f64> = hds.iter().flat_map(|h| f(&h.region)).collect();
    Array2::from_shape_vec((hds.len(), 3), flat).map_err(invalid_data)
}

fn save_headers(path: &Path, hds: &[BlockHeader]) -> io::Result<()> {
    let mut npz = NpzWriter::new(File::create(path)?);
    let index: Vec<i64> = hds.iter().map(|h| h.index).collect();
    let counts: Vec<u64> = hds.iter().map(|h| h.n_particles).collect();
    let box_width: Vec<f64> = hds.iter().map(|h| h.region.box_width).collect();
    npz.add_array("index.npy", &Array1::from_vec(index))
        .map_err(invalid_data)?;
    npz.add_array("n_particles.npy", &Array1::from_vec(counts))
        .map_err(invalid_data)?;
    npz.add_array("origin.npy", &rows3(hds, |r| r.origin)?)
        .map_err(invalid_data)?;
    npz.add_array("width.npy", &rows3(hds, |r| r.width)?)
        .map_err(invalid_data)?;
    npz.add_array("box_width.npy", &Array1::from_vec(box_width))
        .map_err(invalid_data)?;
    npz.finish().map_err(invalid_data)?;
    Ok(())
}

fn load_headers(path: &Path, cfg: &SnapshotConfig, snap: i64) -> io::Result<Vec<BlockHeader>> {
    let mut npz = NpzReader::new(File::open(path)?).map_err(invalid_data)?;
    let index: Array1<i64> = npz.by_name("index.npy").map_err(invalid_data)?;
    let counts: Array1<u64> = npz.by_name("n_particles.npy").map_err(invalid_data)?;
    let origin: Array2<f64> = npz.by_name("origin.npy").map_err(invalid_data)?;
    let width: Array2<f64> = npz.by_name("width.npy").map_err(invalid_data)?;
    let box_width: Array1<f64> = npz.by_name("box_width.npy").map_err(invalid_data)?;

    let n = index.len();
    if counts.len() != n
        || box_width.len() != n
        || origin.shape() != [n, 3]
        || width.shape() != [n, 3]
    {
        return Err(invalid_data("header cache arrays disagree in length"));
    }
    let expected = (cfg.block_max - cfg.block_min + 1).max(0) as usize;
    if n != expected {
        return Err(invalid_data(format!("cache holds {n} blocks, expected {expected}")));
    }

    (0..n)
        .map(|i| -> io::Result<BlockHeader> {
            let path = expand_path(&cfg.path, snap, index[i]).map_err(invalid_data)?;
            Ok(BlockHeader {
                index: index[i],
                path,
                region: BlockRegion {
                    origin: [origin[[i, 0]], origin[[i, 1]], origin[[i, 2]]],
                    width: [width[[i, 0]], width[[i, 1]], width[[i, 2]]],
                    box_width: box_width[i],
                },
                n_particles: counts[i],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::npz::{NpzFormat, write_block};
    use crate::snapshot::ParticleBlock;

    fn write_snapshot(dir: &Path, snap: i64, n_blocks: i64) -> SnapshotConfig {
        let cfg = SnapshotConfig {
            path: dir
                .join("snap_{snap:03}.{block}.npz")
                .to_string_lossy()
                .into_owned(),
            block_min: 0,
            block_max: n_blocks - 1,
            ..Default::default()
        };
        for b in 0..n_blocks {
            let region = BlockRegion {
                origin: [b as f64 * 5.0, 0.0, 0.0],
                width: [5.0, 10.0, 10.0],
                box_width: 10.0 * n_blocks as f64,
            };
            let block = ParticleBlock {
                positions: vec![[b as f32 * 5.0 + 1.0, 1.0, 1.0]; (b + 1) as usize],
                masses: vec![1.0; (b + 1) as usize],
            };
            write_block(&expand_path(&cfg.path, snap, b).unwrap(), &block, &region).unwrap();
        }
        cfg
    }

    #[test]
    fn test_cache_builds_then_serves() {
        let data = tempfile::tempdir().unwrap();
        let memo = tempfile::tempdir().unwrap();
        let cfg = write_snapshot(data.path(), 3, 2);

        let cache = HeaderCache::open(memo.path(), "abc").unwrap();
        let fresh = cache.headers(&NpzFormat, &cfg, 3).unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[1].n_particles, 2);
        assert!(memo.path().join("hd_snap3.npz").exists());

        // remove the block files: the second call must come from the cache
        for h in &fresh {
            std::fs::remove_file(&h.path).unwrap();
        }
        let cached = cache.headers(&NpzFormat, &cfg, 3).unwrap();
        assert_eq!(cached, fresh);
    }

    #[test]
    fn test_fingerprint_mismatch_invalidates() {
        let data = tempfile::tempdir().unwrap();
        let memo = tempfile::tempdir().unwrap();
        let cfg = write_snapshot(data.path(), 7, 1);

        HeaderCache::open(memo.path(), "old")
            .unwrap()
            .headers(&NpzFormat, &cfg, 7)
            .unwrap();
        assert!(memo.path().join("hd_snap7.npz").exists());

        HeaderCache::open(memo.path(), "old").unwrap();
        assert!(memo.path().join("hd_snap7.npz").exists());

        HeaderCache::open(memo.path(), "new").unwrap();
        assert!(!memo.path().join("hd_snap7.npz").exists());
        let fp = std::fs::read_to_string(memo.path().join(FINGERPRINT_FILE)).unwrap();
        assert_eq!(fp.trim(), "new");
    }

    #[test]
    fn test_missing_snapshot_is_header_error() {
        let data = tempfile::tempdir().unwrap();
        let memo = tempfile::tempdir().unwrap();
        let cfg = write_snapshot(data.path(), 1, 1);
        let cache = HeaderCache::open(memo.path(), "fp").unwrap();
        let err = cache.headers(&NpzFormat, &cfg, 2).unwrap_err();
        assert!(matches!(err, HaloError::SnapshotHeader { snap: 2, .. }));
    }
}
