//! NPZ blocks.
//!
//! Arrays: `x.npy` (N x 3 f32), `m.npy` (N f32), `origin.npy` (3 f64),
//! `width.npy` (3 f64), `box_width.npy` (1 f64, <= 0 for non-periodic).

use ndarray::{Array1, Array2};
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::{BlockMeta, ParticleBlock, SnapshotFormat, invalid_data};
use crate::geom::BlockRegion;

#[derive(Debug, Clone, Copy, Default)]
pub struct NpzFormat;

pub struct NpzHandle {
    path: PathBuf,
    npz: NpzReader<File>,
}

fn read_f64<R: io::Read + io::Seek>(npz: &mut NpzReader<R>, name: &str) -> io::Result<Array1<f64>> {
    npz.by_name(name)
        .map_err(|e| invalid_data(format!("missing {name}: {e}")))
}

fn read_vec3<R: io::Read + io::Seek>(npz: &mut NpzReader<R>, name: &str) -> io::Result<[f64; 3]> {
    let a = read_f64(npz, name)?;
    if a.len() != 3 {
        return Err(invalid_data(format!("{name} has {} entries, expected 3", a.len())));
    }
    Ok([a[0], a[1], a[2]])
}

fn read_region<R: io::Read + io::Seek>(npz: &mut NpzReader<R>) -> io::Result<BlockRegion> {
    let origin = read_vec3(npz, "origin.npy")?;
    let width = read_vec3(npz, "width.npy")?;
    let box_width = read_f64(npz, "box_width.npy")?
        .get(0)
        .copied()
        .ok_or_else(|| invalid_data("box_width.npy is empty"))?;
    Ok(BlockRegion {
        origin,
        width,
        box_width,
    })
}

impl SnapshotFormat for NpzFormat {
    type Handle = NpzHandle;

    fn name(&self) -> &'static str {
        "npz"
    }

    fn read_header(&self, path: &Path) -> io::Result<BlockMeta> {
        let mut npz = NpzReader::new(File::open(path)?).map_err(invalid_data)?;
        let region = read_region(&mut npz)?;
        let masses: Array1<f32> = npz
            .by_name("m.npy")
            .map_err(|e| invalid_data(format!("missing m.npy: {e}")))?;
        Ok(BlockMeta {
            region,
            n_particles: masses.len() as u64,
        })
    }

    fn open(&self, path: &Path) -> io::Result<NpzHandle> {
        let npz = NpzReader::new(File::open(path)?).map_err(invalid_data)?;
        Ok(NpzHandle {
            path: path.to_path_buf(),
            npz,
        })
    }

    fn read(&self, handle: &mut NpzHandle) -> io::Result<ParticleBlock> {
        let x: Array2<f32> = handle
            .npz
            .by_name("x.npy")
            .map_err(|e| invalid_data(format!("{}: missing x.npy: {e}", handle.path.display())))?;
        if x.ncols() != 3 {
            return Err(invalid_data(format!(
                "{}: x.npy has shape {:?}, expected N x 3",
                handle.path.display(),
                x.shape()
            )));
        }
        let m: Array1<f32> = handle
            .npz
            .by_name("m.npy")
            .map_err(|e| invalid_data(format!("{}: missing m.npy: {e}", handle.path.display())))?;

        let positions = x.rows().into_iter().map(|r| [r[0], r[1], r[2]]).collect();
        Ok(ParticleBlock {
            positions,
            masses: m.to_vec(),
        })
    }

    fn close(&self, handle: NpzHandle) {
        drop(handle);
    }
}

/// Writes one block in the layout `NpzFormat` reads.
pub fn write_block(path: &Path, block: &ParticleBlock, region: &BlockRegion) -> io::Result<()> {
    let n = block.len();
    let flat: Vec<f32> = block.positions.iter().flat_map(|p| p.iter().copied()).collect();
    let x = Array2::from_shape_vec((n, 3), flat).map_err(invalid_data)?;

    let mut npz = NpzWriter::new(File::create(path)?);
    npz.add_array("x.npy", &x).map_err(invalid_data)?;
    npz.add_array("m.npy", &Array1::from_vec(block.masses.clone()))
        .map_err(invalid_data)?;
    npz.add_array("origin.npy", &Array1::from_vec(region.origin.to_vec()))
        .map_err(invalid_data)?;
    npz.add_array("width.npy", &Array1::from_vec(region.width.to_vec()))
        .map_err(invalid_data)?;
    npz.add_array("box_width.npy", &Array1::from_vec(vec![region.box_width]))
        .map_err(invalid_data)?;
    npz.finish().map_err(invalid_data)?;
    Ok(())
}
