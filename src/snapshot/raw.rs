//! Flat binary blocks.
//!
//! Layout, all in one byte order:
//! `n: u64 | box_width: f64 | origin: 3 x f64 | width: 3 x f64 |
//!  positions: n x 3 x f32 | masses: n x f32`

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::{BlockMeta, ParticleBlock, SnapshotFormat, invalid_data};
use crate::config::Endianness;
use crate::geom::BlockRegion;

const HEADER_BYTES: u64 = 8 + 8 + 3 * 8 + 3 * 8;
const PARTICLE_BYTES: u64 = 3 * 4 + 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawFormat {
    pub endianness: Endianness,
}

pub struct RawHandle {
    reader: BufReader<File>,
    file_len: u64,
}

fn read_meta<R: Read, E: ByteOrder>(r: &mut R) -> io::Result<BlockMeta> {
    let n_particles = r.read_u64::<E>()?;
    let box_width = r.read_f64::<E>()?;
    let mut origin = [0f64; 3];
    r.read_f64_into::<E>(&mut origin)?;
    let mut width = [0f64; 3];
    r.read_f64_into::<E>(&mut width)?;
    Ok(BlockMeta {
        region: BlockRegion {
            origin,
            width,
            box_width,
        },
        n_particles,
    })
}

fn read_particles<R: Read, E: ByteOrder>(r: &mut R, file_len: u64) -> io::Result<ParticleBlock> {
    let meta = read_meta::<R, E>(r)?;
    let n = meta.n_particles;
    let expected = n
        .checked_mul(PARTICLE_BYTES)
        .and_then(|b| b.checked_add(HEADER_BYTES))
        .ok_or_else(|| invalid_data(format!("particle count {n} overflows")))?;
    if expected != file_len {
        return Err(invalid_data(format!(
            "header claims {n} particles ({expected} bytes) but file has {file_len} bytes"
        )));
    }
    let n = n as usize;
    let mut flat = vec![0f32; 3 * n];
    r.read_f32_into::<E>(&mut flat)?;
    let mut masses = vec![0f32; n];
    r.read_f32_into::<E>(&mut masses)?;
    let positions = flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
    Ok(ParticleBlock { positions, masses })
}

fn write_all<W: Write, E: ByteOrder>(
    w: &mut W,
    block: &ParticleBlock,
    region: &BlockRegion,
) -> io::Result<()> {
    w.write_u64::<E>(block.len() as u64)?;
    w.write_f64::<E>(region.box_width)?;
    for &v in region.origin.iter().chain(region.width.iter()) {
        w.write_f64::<E>(v)?;
    }
    for p in &block.positions {
        for &v in p {
            w.write_f32::<E>(v)?;
        }
    }
    for &m in &block.masses {
        w.write_f32::<E>(m)?;
    }
    Ok(())
}

impl SnapshotFormat for RawFormat {
    type Handle = RawHandle;

    fn name(&self) -> &'static str {
        "raw"
    }

    fn read_header(&self, path: &Path) -> io::Result<BlockMeta> {
        let mut r = BufReader::new(File::open(path)?);
        match self.endianness {
            Endianness::Little => read_meta::<_, LittleEndian>(&mut r),
            Endianness::Big => read_meta::<_, BigEndian>(&mut r),
        }
    }

    fn open(&self, path: &Path) -> io::Result<RawHandle> {
        let f = File::open(path)?;
        let file_len = f.metadata()?.len();
        Ok(RawHandle {
            reader: BufReader::new(f),
            file_len,
        })
    }

    fn read(&self, handle: &mut RawHandle) -> io::Result<ParticleBlock> {
        let len = handle.file_len;
        match self.endianness {
            Endianness::Little => read_particles::<_, LittleEndian>(&mut handle.reader, len),
            Endianness::Big => read_particles::<_, BigEndian>(&mut handle.reader, len),
        }
    }

    fn close(&self, handle: RawHandle) {
        drop(handle);
    }
}

/// Writes one block in the layout `RawFormat` reads.
pub fn write_block(
    path: &Path,
    endianness: Endianness,
    block: &ParticleBlock,
    region: &BlockRegion,
) -> io::Result<()> {
    if block.positions.len() != block.masses.len() {
        return Err(invalid_data("positions and masses differ in length"));
    }
    let mut w = BufWriter::new(File::create(path)?);
    match endianness {
        Endianness::Little => write_all::<_, LittleEndian>(&mut w, block, region)?,
        Endianness::Big => write_all::<_, BigEndian>(&mut w, block, region)?,
    }
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ParticleBlock, BlockRegion) {
        let block = ParticleBlock {
            positions: vec![[0.5, 1.5, 2.5], [3.0, -1.0, 8.0]],
            masses: vec![3.0, 4.0],
        };
        let region = BlockRegion {
            origin: [-1.0, 0.0, 1.0],
            width: [5.0, 6.0, 7.0],
            box_width: 0.0,
        };
        (block, region)
    }

    #[test]
    fn test_big_endian_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.0");
        let (block, region) = sample();
        write_block(&path, Endianness::Big, &block, &region).unwrap();

        let fmt = RawFormat { endianness: Endianness::Big };
        let meta = fmt.read_header(&path).unwrap();
        assert_eq!(meta.n_particles, 2);
        assert_eq!(meta.region, region);

        let mut h = fmt.open(&path).unwrap();
        assert_eq!(fmt.read(&mut h).unwrap(), block);
        fmt.close(h);
    }

    #[test]
    fn test_wrong_byte_order_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.0");
        let (block, region) = sample();
        write_block(&path, Endianness::Little, &block, &region).unwrap();

        // 2 read big-endian is 2 << 56 particles, far more than the file holds
        let fmt = RawFormat { endianness: Endianness::Big };
        let mut h = fmt.open(&path).unwrap();
        assert!(fmt.read(&mut h).is_err());
    }

    #[test]
    fn test_truncated_block_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.0");
        let (block, region) = sample();
        write_block(&path, Endianness::Little, &block, &region).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let fmt = RawFormat::default();
        let mut h = fmt.open(&path).unwrap();
        assert!(fmt.read(&mut h).is_err());
    }
}
