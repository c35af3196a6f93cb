//! consistent-trees text files and main-progenitor lookups.

use ahash::AHashMap;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{HaloError, Result};

// consistent-trees 1.x column layout
const COL_ID: usize = 1;
const COL_DESC_ID: usize = 3;
const COL_MMP: usize = 14;
const COL_ORIG_ID: usize = 30;
const COL_SNAP: usize = 31;
const MIN_COLS: usize = COL_SNAP + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRow {
    /// tree-wide unique id
    pub id: i64,
    pub desc_id: i64,
    /// true when this halo is its descendant's most massive progenitor
    pub mmp: bool,
    /// halo catalog id
    pub orig_id: i64,
    pub snap: i64,
}

/// Skips `#` lines and short lines (the leading tree count).
pub fn parse_tree_text(text: &str, path: &Path) -> Result<Vec<TreeRow>> {
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let t = line.trim_start();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        let toks: Vec<&str> = t.split_whitespace().collect();
        if toks.len() < MIN_COLS {
            continue;
        }
        let parse_err = |col: usize| HaloError::TreeParse {
            path: path.to_path_buf(),
            line: lineno + 1,
            reason: format!("column {col} = {:?} is not an integer", toks[col]),
        };
        let int = |col: usize| -> Result<i64> {
            let tok = toks[col];
            // ids are integers but some writers emit them as floats
            tok.parse::<i64>()
                .or_else(|_| tok.parse::<f64>().map(|v| v as i64))
                .map_err(|_| parse_err(col))
        };
        rows.push(TreeRow {
            id: int(COL_ID)?,
            desc_id: int(COL_DESC_ID)?,
            mmp: int(COL_MMP)? == 1,
            orig_id: int(COL_ORIG_ID)?,
            snap: int(COL_SNAP)?,
        });
    }
    Ok(rows)
}

pub fn parse_tree_file(path: &Path) -> Result<Vec<TreeRow>> {
    let text = std::fs::read_to_string(path).map_err(|e| HaloError::TreeParse {
        path: path.to_path_buf(),
        line: 0,
        reason: e.to_string(),
    })?;
    parse_tree_text(&text, path)
}

/// Main-progenitor lookup for a halo identified by catalog id and snapshot.
pub trait BranchQuery {
    /// `(id, snapshot)` pairs from the seed backwards; empty if unknown.
    fn branch(&self, id: i64, snap: i64) -> Vec<(i64, i64)>;
}

#[derive(Debug, Default)]
pub struct Forest {
    nodes: AHashMap<i64, (i64, i64)>,
    by_catalog: AHashMap<(i64, i64), i64>,
    main_prog: AHashMap<i64, i64>,
    snap_offset: i64,
}

impl Forest {
    pub fn from_rows(rows: impl IntoIterator<Item = TreeRow>, snap_offset: i64) -> Self {
        let mut f = Forest {
            snap_offset,
            ..Default::default()
        };
        for r in rows {
            let snap = r.snap + snap_offset;
            f.nodes.insert(r.id, (r.orig_id, snap));
            f.by_catalog.entry((r.orig_id, snap)).or_insert(r.id);
            if r.mmp && r.desc_id >= 0 {
                f.main_prog.insert(r.desc_id, r.id);
            }
        }
        f
    }

    /// Parses every file in parallel.
    pub fn load(paths: &[PathBuf], snap_offset: i64) -> Result<Self> {
        let per_file: Vec<Vec<TreeRow>> = paths
            .par_iter()
            .map(|p| {
                let rows = parse_tree_file(p)?;
                debug!(path = %p.display(), rows = rows.len(), "parsed tree file");
                Ok(rows)
            })
            .collect::<Result<_>>()?;
        let forest = Forest::from_rows(per_file.into_iter().flatten(), snap_offset);
        info!(
            files = paths.len(),
            halos = forest.len(),
            snap_offset = forest.snap_offset,
            "loaded merger trees"
        );
        Ok(forest)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl BranchQuery for Forest {
    fn branch(&self, id: i64, snap: i64) -> Vec<(i64, i64)> {
        let Some(&start) = self.by_catalog.get(&(id, snap)) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cur = Some(start);
        // bounded walk; a malformed tree cannot loop forever
        while let Some(node) = cur {
            if out.len() > self.nodes.len() {
                break;
            }
            if let Some(&pair) = self.nodes.get(&node) {
                out.push(pair);
            }
            cur = self.main_prog.get(&node).copied();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One consistent-trees data row with only the used columns filled.
    fn ct_line(id: i64, desc_id: i64, mmp: i64, orig_id: i64, snap: i64) -> String {
        let mut cols = vec!["0".to_string(); MIN_COLS + 3];
        cols[0] = "0.5".to_string();
        cols[COL_ID] = id.to_string();
        cols[COL_DESC_ID] = desc_id.to_string();
        cols[COL_MMP] = mmp.to_string();
        cols[COL_ORIG_ID] = orig_id.to_string();
        cols[COL_SNAP] = snap.to_string();
        cols.join(" ")
    }

    fn sample_text() -> String {
        // halo 100 at snap 10 <- 90 (mmp) at 9 <- 80 (mmp) at 8; 91 at 9 merges in
        [
            "#scale(0) id(1) desc_scale(2) desc_id(3) num_prog(4) ...".to_string(),
            "1".to_string(),
            "#tree 100".to_string(),
            ct_line(100, -1, 1, 5, 10),
            ct_line(90, 100, 1, 3, 9),
            ct_line(91, 100, 0, 4, 9),
            ct_line(80, 90, 1, 2, 8),
        ]
        .join("\n")
    }

    #[test]
    fn test_parse_rows() {
        let rows = parse_tree_text(&sample_text(), Path::new("tree_0_0_0.dat")).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[1],
            TreeRow { id: 90, desc_id: 100, mmp: true, orig_id: 3, snap: 9 }
        );
        assert!(!rows[2].mmp);
    }

    #[test]
    fn test_bad_integer_reports_line() {
        let text = ct_line(1, -1, 1, 7, 10).replacen(" 7 ", " seven ", 1);
        let text = format!("# header\n{text}");
        match parse_tree_text(&text, Path::new("t.dat")) {
            Err(HaloError::TreeParse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected TreeParse, got {other:?}"),
        }
    }

    #[test]
    fn test_main_branch_walk() {
        let rows = parse_tree_text(&sample_text(), Path::new("t.dat")).unwrap();
        let f = Forest::from_rows(rows, 0);
        assert_eq!(f.branch(5, 10), vec![(5, 10), (3, 9), (2, 8)]);
        // branches can start mid-history
        assert_eq!(f.branch(3, 9), vec![(3, 9), (2, 8)]);
        assert_eq!(f.branch(4, 9), vec![(4, 9)]);
        assert!(f.branch(5, 11).is_empty());
        assert!(f.branch(77, 10).is_empty());
    }

    #[test]
    fn test_snap_offset_shifts_output_and_lookup() {
        let rows = parse_tree_text(&sample_text(), Path::new("t.dat")).unwrap();
        let f = Forest::from_rows(rows, 2);
        assert_eq!(f.branch(5, 12), vec![(5, 12), (3, 11), (2, 10)]);
        assert!(f.branch(5, 10).is_empty());
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("tree_0_0_0.dat");
        let b = dir.path().join("tree_0_0_1.dat");
        std::fs::write(&a, sample_text()).unwrap();
        std::fs::write(&b, format!("1\n#tree 500\n{}", ct_line(500, -1, 1, 42, 10))).unwrap();
        let f = Forest::load(&[a, b], 0).unwrap();
        assert_eq!(f.len(), 5);
        assert_eq!(f.branch(42, 10), vec![(42, 10)]);
    }
}
