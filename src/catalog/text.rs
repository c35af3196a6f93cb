//! Whitespace-separated catalog text: one row per line, `#` lines are comments.

use itertools::Itertools;

use crate::error::{HaloError, Result};

pub const SENTINEL: i64 = -1;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Columns {
    pub ints: Vec<Vec<i64>>,
    pub floats: Vec<Vec<f64>>,
}

impl Columns {
    pub fn n_rows(&self) -> usize {
        self.ints
            .first()
            .map(|c| c.len())
            .or_else(|| self.floats.first().map(|c| c.len()))
            .unwrap_or(0)
    }
}

#[inline]
fn is_data_line(line: &str) -> bool {
    let t = line.trim_start();
    !t.is_empty() && !t.starts_with('#')
}

/// Pulls the requested columns out of every data line.
///
/// A sentinel row (all requested integer columns equal to -1) may be shorter
/// than the other rows; its missing float columns read as -1.
pub fn parse_cols<S: AsRef<str>>(
    lines: &[S],
    int_cols: &[usize],
    float_cols: &[usize],
) -> Result<Columns> {
    let mut out = Columns {
        ints: vec![Vec::new(); int_cols.len()],
        floats: vec![Vec::new(); float_cols.len()],
    };

    for (lineno, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        if !is_data_line(line) {
            continue;
        }
        let toks: Vec<&str> = line.split_whitespace().collect();

        let mut row_ints = Vec::with_capacity(int_cols.len());
        for &c in int_cols {
            let tok = toks.get(c).ok_or_else(|| {
                HaloError::MalformedInput(format!(
                    "line {}: expected at least {} columns, found {}",
                    lineno + 1,
                    c + 1,
                    toks.len()
                ))
            })?;
            let v = tok.parse::<i64>().map_err(|_| {
                HaloError::MalformedInput(format!(
                    "line {}: column {} = {:?} is not an integer",
                    lineno + 1,
                    c,
                    tok
                ))
            })?;
            row_ints.push(v);
        }
        let sentinel = !row_ints.is_empty() && row_ints.iter().all(|&v| v == SENTINEL);

        for (k, &c) in float_cols.iter().enumerate() {
            let v = match toks.get(c) {
                Some(tok) => tok.parse::<f64>().map_err(|_| {
                    HaloError::MalformedInput(format!(
                        "line {}: column {} = {:?} is not a number",
                        lineno + 1,
                        c,
                        tok
                    ))
                })?,
                None if sentinel => SENTINEL as f64,
                None => {
                    return Err(HaloError::MalformedInput(format!(
                        "line {}: expected at least {} columns, found {}",
                        lineno + 1,
                        c + 1,
                        toks.len()
                    )));
                }
            };
            out.floats[k].push(v);
        }
        for (k, v) in row_ints.into_iter().enumerate() {
            out.ints[k].push(v);
        }
    }
    Ok(out)
}

pub fn format_row(ints: &[i64], floats: &[f64]) -> String {
    ints.iter()
        .map(|v| format!("{v:>10}"))
        .chain(floats.iter().map(|v| format!("{v:>14.6e}")))
        .join(" ")
}

/// `# Column contents: ID(0) Snapshot(1) R [cMpc/h](2-151) ...`
///
/// Each name spans `repeats[i]` consecutive columns; single columns print
/// one index, repeated ones print the inclusive range.
pub fn comment_header(names: &[&str], repeats: &[usize]) -> String {
    let mut col = 0usize;
    let mut parts = names.iter().zip(repeats).map(|(name, &n)| {
        let part = match n {
            0 => format!("{name}()"),
            1 => format!("{name}({col})"),
            _ => format!("{name}({}-{})", col, col + n - 1),
        };
        col += n;
        part
    });
    format!("# Column contents: {}", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let lines = [
            "# Column contents: ID(0) Snapshot(1)",
            "",
            "  12  100  1.5 2.5 3.5 0.75",
            "   7   99  4.0 5.0 6.0 1.25 extra",
        ];
        let cols = parse_cols(&lines, &[0, 1], &[2, 3, 4, 5]).unwrap();
        assert_eq!(cols.n_rows(), 2);
        assert_eq!(cols.ints[0], vec![12, 7]);
        assert_eq!(cols.ints[1], vec![100, 99]);
        assert_eq!(cols.floats[3], vec![0.75, 1.25]);
    }

    #[test]
    fn test_short_sentinel_row_is_padded() {
        let lines = ["1 10 0 0 0 1", "-1 -1", "2 10 1 1 1 1"];
        let cols = parse_cols(&lines, &[0, 1], &[2, 3, 4, 5]).unwrap();
        assert_eq!(cols.ints[1], vec![10, -1, 10]);
        assert_eq!(cols.floats[0], vec![0.0, -1.0, 1.0]);
    }

    #[test]
    fn test_short_real_row_is_error() {
        let lines = ["1 10 0 0"];
        let err = parse_cols(&lines, &[0, 1], &[2, 3, 4, 5]).unwrap_err();
        assert!(matches!(err, HaloError::MalformedInput(_)));
    }

    #[test]
    fn test_bad_integer_is_error() {
        let lines = ["1.5 10"];
        assert!(parse_cols(&lines, &[0, 1], &[]).is_err());
    }

    #[test]
    fn test_format_row_parses_back() {
        let line = format_row(&[42, 7], &[1.25e14, 0.0]);
        let cols = parse_cols(&[line], &[0, 1], &[2, 3]).unwrap();
        assert_eq!(cols.ints[0], vec![42]);
        assert_eq!(cols.floats[0], vec![1.25e14]);
        assert_eq!(cols.floats[1], vec![0.0]);
    }

    #[test]
    fn test_comment_header() {
        let h = comment_header(&["ID", "Snapshot", "R", "Rho"], &[1, 1, 3, 3]);
        assert_eq!(h, "# Column contents: ID(0) Snapshot(1) R(2-4) Rho(5-7)");
        assert!(!is_data_line(&h));
    }
}
