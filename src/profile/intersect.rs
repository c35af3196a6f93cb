use rayon::prelude::*;
use smallvec::SmallVec;

use crate::catalog::HaloRecord;
use crate::config::ProfConfig;
use crate::geom::{BoundingSphere, wrap_position};
use crate::snapshot::BlockHeader;

/// Outer support sphere (`R200m * r_max_mult`) for each of `idxs`, with the
/// center wrapped into the periodic box.
pub fn bounding_spheres(
    halos: &[HaloRecord],
    idxs: &[usize],
    cfg: &ProfConfig,
    box_width: f64,
) -> Vec<BoundingSphere> {
    idxs.iter()
        .map(|&i| {
            let h = &halos[i];
            BoundingSphere {
                center: h.position.map(|x| wrap_position(x, box_width) as f32),
                radius: (h.r200m * cfg.r_max_mult) as f32,
            }
        })
        .collect()
}

/// Block/halo overlap in both directions. Halo indices refer to the sphere
/// list, block indices to the header list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intersections {
    pub block_halos: Vec<Vec<usize>>,
    pub halo_blocks: Vec<SmallVec<[usize; 4]>>,
}

impl Intersections {
    pub fn n_relevant_blocks(&self) -> usize {
        self.block_halos.iter().filter(|v| !v.is_empty()).count()
    }
}

pub fn bin_sphere_intersections(hds: &[BlockHeader], spheres: &[BoundingSphere]) -> Intersections {
    let block_halos: Vec<Vec<usize>> = hds
        .par_iter()
        .map(|hd| {
            spheres
                .iter()
                .enumerate()
                .filter(|(_, s)| hd.region.intersects_sphere(s))
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let mut halo_blocks: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); spheres.len()];
    for (i, halos) in block_halos.iter().enumerate() {
        for &j in halos {
            halo_blocks[j].push(i);
        }
    }

    Intersections {
        block_halos,
        halo_blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::BlockRegion;
    use std::path::PathBuf;

    /// 2 x 1 x 1 grid of 50-wide blocks in a periodic 100 box.
    fn headers() -> Vec<BlockHeader> {
        (0..2)
            .map(|i| BlockHeader {
                index: i,
                path: PathBuf::from(format!("block_{i}")),
                region: BlockRegion {
                    origin: [50.0 * i as f64, 0.0, 0.0],
                    width: [50.0, 100.0, 100.0],
                    box_width: 100.0,
                },
                n_particles: 0,
            })
            .collect()
    }

    fn halo(x: f64, r200m: f64) -> HaloRecord {
        HaloRecord {
            id: 0,
            snapshot: 0,
            position: [x, 50.0, 50.0],
            r200m,
        }
    }

    #[test]
    fn test_bounding_sphere_radius_and_wrap() {
        let halos = vec![halo(101.0, 2.0), halo(-3.0, 1.0)];
        let cfg = ProfConfig::default();
        let s = bounding_spheres(&halos, &[0, 1], &cfg, 100.0);
        assert!((s[0].radius - 6.0).abs() < 1e-6);
        assert!((s[0].center[0] - 1.0).abs() < 1e-4);
        assert!((s[1].center[0] - 97.0).abs() < 1e-4);
    }

    #[test]
    fn test_intersections_both_ways() {
        let halos = vec![
            halo(25.0, 1.0), // deep inside block 0
            halo(49.0, 1.0), // straddles the 0/1 boundary
            halo(98.0, 1.0), // straddles the periodic edge
            halo(75.0, 1.0), // deep inside block 1
        ];
        let spheres = bounding_spheres(&halos, &[0, 1, 2, 3], &ProfConfig::default(), 100.0);
        let intr = bin_sphere_intersections(&headers(), &spheres);

        assert_eq!(intr.block_halos[0], vec![0, 1, 2]);
        assert_eq!(intr.block_halos[1], vec![1, 2, 3]);
        assert_eq!(intr.halo_blocks[0].as_slice(), &[0]);
        assert_eq!(intr.halo_blocks[1].as_slice(), &[0, 1]);
        assert_eq!(intr.halo_blocks[2].as_slice(), &[0, 1]);
        assert_eq!(intr.halo_blocks[3].as_slice(), &[1]);
        assert_eq!(intr.n_relevant_blocks(), 2);
    }

    #[test]
    fn test_no_halos_means_no_relevant_blocks() {
        let intr = bin_sphere_intersections(&headers(), &[]);
        assert_eq!(intr.n_relevant_blocks(), 0);
        assert!(intr.halo_blocks.is_empty());
    }
}
