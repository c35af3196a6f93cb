//! Spheres, axis-aligned block regions and the periodic (3-torus) distance
//! helpers shared by culling and binning.

/// A halo's outer support. Single precision to match particle positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: [f32; 3],
    pub radius: f32,
}

/// Axis-aligned spatial domain of one data block, inside a box of side
/// `box_width`. A non-positive `box_width` means the volume is not periodic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockRegion {
    pub origin: [f64; 3],
    pub width: [f64; 3],
    pub box_width: f64,
}

impl BlockRegion {
    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.box_width > 0.0
    }

    /// Sphere-vs-box overlap using the minimum image on every axis.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        let r = sphere.radius as f64;
        let r2 = r * r;
        let mut d2 = 0.0f64;
        for k in 0..3 {
            let c = sphere.center[k] as f64;
            let lo = self.origin[k];
            let hi = lo + self.width[k];
            let d = if self.is_periodic() {
                let l = self.box_width;
                interval_distance(c - l, lo, hi)
                    .min(interval_distance(c, lo, hi))
                    .min(interval_distance(c + l, lo, hi))
            } else {
                interval_distance(c, lo, hi)
            };
            d2 += d * d;
            if d2 > r2 {
                return false;
            }
        }
        true
    }
}

#[inline]
fn interval_distance(x: f64, lo: f64, hi: f64) -> f64 {
    if x < lo {
        lo - x
    } else if x > hi {
        x - hi
    } else {
        0.0
    }
}

/// Wraps a displacement into `[-L/2, L/2]`. No-op for `box_width <= 0`.
#[inline(always)]
pub fn wrap_displacement(d: f32, box_width: f32) -> f32 {
    if box_width <= 0.0 {
        return d;
    }
    let half = 0.5 * box_width;
    if d > half {
        d - box_width
    } else if d < -half {
        d + box_width
    } else {
        d
    }
}

/// Moves a coordinate into `[0, L)`. No-op for `box_width <= 0`.
#[inline]
pub fn wrap_position(x: f64, box_width: f64) -> f64 {
    if box_width <= 0.0 {
        return x;
    }
    let w = x.rem_euclid(box_width);
    // rem_euclid can round up to exactly L for tiny negative inputs
    if w >= box_width { 0.0 } else { w }
}

/// Squared minimum-image distance between two points.
#[inline(always)]
pub fn periodic_dist2(a: [f32; 3], b: [f32; 3], box_width: f32) -> f32 {
    let dx = wrap_displacement(a[0] - b[0], box_width);
    let dy = wrap_displacement(a[1] - b[1], box_width);
    let dz = wrap_displacement(a[2] - b[2], box_width);
    dx * dx + dy * dy + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(origin: [f64; 3], w: f64, box_width: f64) -> BlockRegion {
        BlockRegion {
            origin,
            width: [w; 3],
            box_width,
        }
    }

    #[test]
    fn test_sphere_inside_and_outside() {
        let region = cube([0.0; 3], 10.0, 0.0);
        let inside = BoundingSphere { center: [5.0, 5.0, 5.0], radius: 1.0 };
        let touching = BoundingSphere { center: [11.0, 5.0, 5.0], radius: 1.0 };
        let away = BoundingSphere { center: [12.0, 5.0, 5.0], radius: 1.0 };
        assert!(region.intersects_sphere(&inside));
        assert!(region.intersects_sphere(&touching));
        assert!(!region.intersects_sphere(&away));
    }

    #[test]
    fn test_corner_uses_euclidean_distance() {
        let region = cube([0.0; 3], 1.0, 0.0);
        // 0.8 past the corner on two axes -> distance ~1.13 > 1.0
        let s = BoundingSphere { center: [1.8, 1.8, 0.5], radius: 1.0 };
        assert!(!region.intersects_sphere(&s));
        let s = BoundingSphere { center: [1.6, 1.6, 0.5], radius: 1.0 };
        assert!(region.intersects_sphere(&s));
    }

    #[test]
    fn test_periodic_wraparound() {
        // block hugging the low x edge, halo just inside the high x edge
        let region = cube([0.0, 40.0, 40.0], 10.0, 100.0);
        let s = BoundingSphere { center: [99.0, 45.0, 45.0], radius: 2.0 };
        assert!(region.intersects_sphere(&s));

        let open = cube([0.0, 40.0, 40.0], 10.0, 0.0);
        assert!(!open.intersects_sphere(&s));
    }

    #[test]
    fn test_wrap_helpers() {
        assert_eq!(wrap_displacement(90.0, 100.0), -10.0);
        assert_eq!(wrap_displacement(-90.0, 100.0), 10.0);
        assert_eq!(wrap_displacement(30.0, 100.0), 30.0);
        assert_eq!(wrap_displacement(90.0, 0.0), 90.0);

        assert_eq!(wrap_position(-1.0, 100.0), 99.0);
        assert_eq!(wrap_position(101.0, 100.0), 1.0);
        assert_eq!(wrap_position(-1.0, 0.0), -1.0);

        let d2 = periodic_dist2([99.0, 0.0, 0.0], [1.0, 0.0, 0.0], 100.0);
        assert!((d2 - 4.0).abs() < 1e-4);
    }
}
