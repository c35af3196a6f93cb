//! Log-radial mass binning around halo centers.

use crate::catalog::HaloRecord;
use crate::config::ProfConfig;
use crate::geom::periodic_dist2;

/// Bin layout for one halo: `bins` log-spaced shells in `(r_min, r_max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinSpec {
    pub center: [f32; 3],
    pub r_min: f64,
    pub r_max: f64,
    pub bins: usize,
    pub box_width: f32,
}

impl BinSpec {
    pub fn new(center: [f32; 3], r200m: f64, cfg: &ProfConfig, box_width: f64) -> Self {
        BinSpec {
            center,
            r_min: r200m * cfg.r_min_mult,
            r_max: r200m * cfg.r_max_mult,
            bins: cfg.bins,
            box_width: box_width as f32,
        }
    }

    pub fn for_halo(halo: &HaloRecord, center: [f32; 3], cfg: &ProfConfig, box_width: f64) -> Self {
        BinSpec::new(center, halo.r200m, cfg, box_width)
    }

    #[inline]
    pub fn ln_min(&self) -> f64 {
        self.r_min.ln()
    }

    #[inline]
    pub fn dln(&self) -> f64 {
        (self.r_max.ln() - self.r_min.ln()) / self.bins as f64
    }

    /// Bin for a squared distance, or `None` outside `(r_min, r_max)`.
    /// NaN distances are outside.
    #[inline]
    pub fn bin_index(&self, r2: f32) -> Option<usize> {
        let r_min2 = (self.r_min * self.r_min) as f32;
        let r_max2 = (self.r_max * self.r_max) as f32;
        if !(r2 > r_min2 && r2 < r_max2) {
            return None;
        }
        let lr = (r2 as f64).ln() * 0.5;
        // negative rounding noise right above r_min saturates to bin 0
        let ir = ((lr - self.ln_min()) / self.dln()) as usize;
        Some(ir.min(self.bins - 1))
    }
}

/// Raw per-shell mass of one halo. Only ever grows by addition.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialBins {
    mass: Vec<f64>,
}

impl RadialBins {
    pub fn new(bins: usize) -> Self {
        RadialBins {
            mass: vec![0.0; bins],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mass.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.mass
    }

    pub fn total_mass(&self) -> f64 {
        self.mass.iter().sum()
    }

    /// Adds another partial accumulation of the same halo.
    pub fn merge(&mut self, other: &RadialBins) {
        debug_assert_eq!(self.len(), other.len());
        for (a, b) in self.mass.iter_mut().zip(&other.mass) {
            *a += *b;
        }
    }
}

/// Adds every particle inside the halo's support to its shell. Particles
/// outside are skipped individually; the rest of the block is still binned.
pub fn insert_points(bins: &mut RadialBins, spec: &BinSpec, positions: &[[f32; 3]], masses: &[f32]) {
    for (x, &m) in positions.iter().zip(masses) {
        let r2 = periodic_dist2(*x, spec.center, spec.box_width);
        if let Some(ir) = spec.bin_index(r2) {
            bins.mass[ir] += m as f64;
        }
    }
}
