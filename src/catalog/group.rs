use ahash::AHashMap;
use itertools::Itertools;

use super::text::{SENTINEL, parse_cols};
use crate::error::{HaloError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaloRecord {
    pub id: i64,
    pub snapshot: i64,
    /// comoving Mpc/h
    pub position: [f64; 3],
    /// comoving Mpc/h
    pub r200m: f64,
}

impl HaloRecord {
    /// Rows carried forward from tree-history framing; never loaded.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.snapshot == SENTINEL
    }
}

/// Parses `ID Snapshot X Y Z R200m` rows.
pub fn parse_halo_catalog<S: AsRef<str>>(lines: &[S]) -> Result<Vec<HaloRecord>> {
    let cols = parse_cols(lines, &[0, 1], &[2, 3, 4, 5])?;
    halos_from_columns(&cols.ints[0], &cols.ints[1], &cols.floats)
}

/// Zips parallel columns into records; `coords` is `[x, y, z, r200m]`.
pub fn halos_from_columns(
    ids: &[i64],
    snaps: &[i64],
    coords: &[Vec<f64>],
) -> Result<Vec<HaloRecord>> {
    if coords.len() != 4 {
        return Err(HaloError::MalformedInput(format!(
            "expected 4 float columns (X, Y, Z, R200m), got {}",
            coords.len()
        )));
    }
    let n = ids.len();
    if snaps.len() != n || coords.iter().any(|c| c.len() != n) {
        return Err(HaloError::MalformedInput(format!(
            "column lengths disagree: ids={}, snaps={}, floats={:?}",
            n,
            snaps.len(),
            coords.iter().map(|c| c.len()).collect::<Vec<_>>()
        )));
    }
    Ok((0..n)
        .map(|i| HaloRecord {
            id: ids[i],
            snapshot: snaps[i],
            position: [coords[0][i], coords[1][i], coords[2][i]],
            r200m: coords[3][i],
        })
        .collect())
}

/// Row indices grouped by snapshot so each snapshot is read once.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGroups {
    /// Distinct real snapshots, ascending.
    pub snaps: Vec<i64>,
    by_snap: AHashMap<i64, Vec<usize>>,
}

impl SnapshotGroups {
    pub fn indices(&self, snap: i64) -> &[usize] {
        self.by_snap.get(&snap).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// `(snapshot, rows)` in ascending snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[usize])> + '_ {
        self.snaps.iter().map(move |&s| (s, self.indices(s)))
    }

    pub fn n_halos(&self) -> usize {
        self.by_snap.values().map(|v| v.len()).sum()
    }
}

/// Fails when there is no real halo to process. Sentinel rows are left out
/// of every group.
pub fn group_by_snapshot(halos: &[HaloRecord]) -> Result<SnapshotGroups> {
    if halos.is_empty() {
        return Err(HaloError::MalformedInput("no input halos".to_string()));
    }
    let mut by_snap: AHashMap<i64, Vec<usize>> = AHashMap::new();
    for (i, h) in halos.iter().enumerate() {
        if h.is_sentinel() {
            continue;
        }
        by_snap.entry(h.snapshot).or_default().push(i);
    }
    if by_snap.is_empty() {
        return Err(HaloError::MalformedInput(format!(
            "all {} input rows are -1 placeholders",
            halos.len()
        )));
    }
    let snaps = by_snap.keys().copied().sorted_unstable().collect();
    Ok(SnapshotGroups { snaps, by_snap })
}
