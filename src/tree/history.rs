use rayon::prelude::*;
use tracing::info;

use super::discover::tree_files;
use super::forest::{BranchQuery, Forest};
use crate::catalog::{SENTINEL, comment_header, format_row, parse_cols};
use crate::config::{GlobalConfig, TreeConfig};
use crate::error::Result;

/// One row of the concatenated history stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRow {
    Entry { id: i64, snap: i64 },
    Separator,
}

impl HistoryRow {
    /// `Separator` serializes as `(-1, -1)`.
    pub fn to_pair(self) -> (i64, i64) {
        match self {
            HistoryRow::Entry { id, snap } => (id, snap),
            HistoryRow::Separator => (SENTINEL, SENTINEL),
        }
    }
}

/// Concatenates every seed's branch in seed order with a `Separator`
/// between consecutive seeds. Unknown seeds contribute nothing but keep
/// their framing.
pub fn frame_histories<Q>(seeds: &[(i64, i64)], query: &Q) -> Vec<HistoryRow>
where
    Q: BranchQuery + Sync,
{
    let branches: Vec<Vec<(i64, i64)>> = seeds
        .par_iter()
        .map(|&(id, snap)| query.branch(id, snap))
        .collect();

    let total = branches.iter().map(Vec::len).sum::<usize>() + seeds.len().saturating_sub(1);
    let mut rows = Vec::with_capacity(total);
    for (i, branch) in branches.into_iter().enumerate() {
        if i > 0 {
            rows.push(HistoryRow::Separator);
        }
        rows.extend(
            branch
                .into_iter()
                .map(|(id, snap)| HistoryRow::Entry { id, snap }),
        );
    }
    rows
}

/// Drops entries outside `[snap_min, snap_max]`; separators always survive.
pub fn filter_snapshot_range(rows: Vec<HistoryRow>, cfg: &TreeConfig) -> Vec<HistoryRow> {
    rows.into_iter()
        .filter(|row| match *row {
            HistoryRow::Entry { snap, .. } => cfg.contains(snap),
            HistoryRow::Separator => true,
        })
        .collect()
}

/// Inverse of the framing: one `(id, snap)` list per seed.
pub fn split_histories(rows: &[HistoryRow]) -> Vec<Vec<(i64, i64)>> {
    rows.split(|r| *r == HistoryRow::Separator)
        .map(|chunk| chunk.iter().map(|r| r.to_pair()).collect())
        .collect()
}

pub fn parse_seeds<S: AsRef<str>>(lines: &[S]) -> Result<Vec<(i64, i64)>> {
    let cols = parse_cols(lines, &[0, 1], &[])?;
    Ok(cols.ints[0]
        .iter()
        .copied()
        .zip(cols.ints[1].iter().copied())
        .collect())
}

pub fn format_history_table(rows: &[HistoryRow]) -> Vec<String> {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(comment_header(&["ID", "Snapshot"], &[1, 1]));
    lines.extend(rows.iter().map(|r| {
        let (id, snap) = r.to_pair();
        format_row(&[id, snap], &[])
    }));
    lines
}

/// Seed text in, history table out.
pub fn history_catalog<S: AsRef<str>>(lines: &[S], cfg: &GlobalConfig) -> Result<Vec<String>> {
    let seeds = parse_seeds(lines)?;
    if seeds.is_empty() {
        info!("no seeds; writing an empty history table");
        return Ok(format_history_table(&[]));
    }
    cfg.validate_for_tree()?;

    let files = tree_files(&cfg.trees.dir)?;
    let forest = Forest::load(&files, cfg.trees.snap_offset)?;
    let rows = frame_histories(&seeds, &forest);
    let rows = filter_snapshot_range(rows, &cfg.trees);
    info!(
        seeds = seeds.len(),
        rows = rows.len() - (seeds.len() - 1),
        snap_min = cfg.trees.snap_min,
        snap_max = cfg.trees.snap_max,
        "walked main branches"
    );
    Ok(format_history_table(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;

    struct FixedBranches(AHashMap<(i64, i64), Vec<(i64, i64)>>);

    impl BranchQuery for FixedBranches {
        fn branch(&self, id: i64, snap: i64) -> Vec<(i64, i64)> {
            self.0.get(&(id, snap)).cloned().unwrap_or_default()
        }
    }

    fn two_halos() -> FixedBranches {
        let mut m = AHashMap::new();
        m.insert((5, 10), vec![(5, 10), (3, 9)]);
        m.insert((7, 10), vec![(7, 10)]);
        FixedBranches(m)
    }

    fn pairs(rows: &[HistoryRow]) -> Vec<(i64, i64)> {
        rows.iter().map(|r| r.to_pair()).collect()
    }

    #[test]
    fn test_separator_only_between_seeds() {
        let rows = frame_histories(&[(5, 10), (7, 10)], &two_halos());
        assert_eq!(pairs(&rows), vec![(5, 10), (3, 9), (-1, -1), (7, 10)]);
        assert!(frame_histories(&[(5, 10)], &two_halos())
            .iter()
            .all(|r| *r != HistoryRow::Separator));
        assert!(frame_histories(&[], &two_halos()).is_empty());
    }

    #[test]
    fn test_unknown_seed_keeps_framing() {
        let seeds = [(5, 10), (99, 10), (7, 10)];
        let rows = frame_histories(&seeds, &two_halos());
        assert_eq!(
            pairs(&rows),
            vec![(5, 10), (3, 9), (-1, -1), (-1, -1), (7, 10)]
        );
        let split = split_histories(&rows);
        assert_eq!(split.len(), seeds.len());
        assert!(split[1].is_empty());
    }

    #[test]
    fn test_range_filter_is_inclusive_and_keeps_separators() {
        let rows = vec![
            HistoryRow::Entry { id: 1, snap: 3 },
            HistoryRow::Entry { id: 1, snap: 5 },
            HistoryRow::Separator,
            HistoryRow::Entry { id: 2, snap: 7 },
            HistoryRow::Entry { id: 2, snap: 10 },
            HistoryRow::Entry { id: 2, snap: 11 },
        ];
        let cfg = TreeConfig {
            snap_min: 5,
            snap_max: 10,
            ..Default::default()
        };
        let kept = filter_snapshot_range(rows, &cfg);
        assert_eq!(pairs(&kept), vec![(1, 5), (-1, -1), (2, 7), (2, 10)]);
    }

    #[test]
    fn test_table_format() {
        let rows = [
            HistoryRow::Entry { id: 5, snap: 10 },
            HistoryRow::Separator,
        ];
        let lines = format_history_table(&rows);
        assert_eq!(lines[0], "# Column contents: ID(0) Snapshot(1)");
        assert_eq!(lines.len(), 3);
        let toks: Vec<i64> = lines[2]
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(toks, vec![-1, -1]);
    }

    #[test]
    fn test_empty_seeds_skip_tree_lookup() {
        // trees.dir is unset, which would fail validation if it were consulted
        let cfg = GlobalConfig::default();
        let lines = history_catalog(&["# ID Snapshot", ""], &cfg).unwrap();
        assert_eq!(lines, vec![format_history_table(&[])[0].clone()]);
    }

    #[test]
    fn test_parse_seeds_ignores_comments() {
        let seeds = parse_seeds(&["# ID Snapshot", "5 10", "  7   10  ", ""]).unwrap();
        assert_eq!(seeds, vec![(5, 10), (7, 10)]);
    }
}
