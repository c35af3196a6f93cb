use std::f64::consts::PI;

use super::accumulate::RadialBins;

/// Final per-halo density profile. `radii` are shell geometric centers.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// cMpc/h
    pub radii: Vec<f64>,
    /// h^2 Msun / cMpc^3
    pub density: Vec<f64>,
}

impl Profile {
    pub fn len(&self) -> usize {
        self.radii.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radii.is_empty()
    }
}

/// Divides each shell's mass by its volume.
pub fn normalize(bins: &RadialBins, r_min: f64, r_max: f64) -> Profile {
    let n = bins.len();
    let ln_min = r_min.ln();
    let dln = (r_max.ln() - ln_min) / n as f64;

    let mut radii = Vec::with_capacity(n);
    let mut density = Vec::with_capacity(n);
    for (j, &mass) in bins.as_slice().iter().enumerate() {
        radii.push((ln_min + dln * (j as f64 + 0.5)).exp());

        let r_lo = (ln_min + dln * j as f64).exp();
        let r_hi = (ln_min + dln * (j + 1) as f64).exp();
        let dv = (r_hi * r_hi * r_hi - r_lo * r_lo * r_lo) * 4.0 * PI / 3.0;
        density.push(mass / dv);
    }
    Profile { radii, density }
}
