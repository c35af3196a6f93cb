use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, info_span};

use super::accumulate::{BinSpec, RadialBins, insert_points};
use super::intersect::{bin_sphere_intersections, bounding_spheres};
use super::normalize::{Profile, normalize};
use crate::catalog::{
    HaloRecord, SENTINEL, comment_header, format_row, group_by_snapshot, parse_halo_catalog,
};
use crate::config::{GlobalConfig, ProfConfig};
use crate::error::{HaloError, Result};
use crate::runtime;
use crate::snapshot::{CachedHeaders, HeaderCache, HeaderProvider, SnapshotFormat, read_block};

fn check_radii(halos: &[HaloRecord]) -> Result<()> {
    for (row, h) in halos.iter().enumerate() {
        if h.is_sentinel() {
            continue;
        }
        if !(h.r200m.is_finite() && h.r200m > 0.0) {
            return Err(HaloError::MalformedInput(format!(
                "row {row} (ID {}): R200m = {} is not a positive radius",
                h.id, h.r200m
            )));
        }
    }
    Ok(())
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} snapshots {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Raw shell masses for every halo, visiting each snapshot once in
/// ascending order. Sentinel rows get `None`.
pub fn accumulate_catalog<H, F>(
    halos: &[HaloRecord],
    cfg: &ProfConfig,
    headers: &H,
    format: &F,
) -> Result<Vec<Option<RadialBins>>>
where
    H: HeaderProvider,
    F: SnapshotFormat,
{
    cfg.validate()?;
    check_radii(halos)?;
    let groups = group_by_snapshot(halos)?;
    let mem_budget = runtime::memory_budget_bytes();

    let mut bins: Vec<Option<RadialBins>> = halos
        .iter()
        .map(|h| (!h.is_sentinel()).then(|| RadialBins::new(cfg.bins)))
        .collect();

    let pb = progress_bar(groups.snaps.len() as u64);
    for (snap, idxs) in groups.iter() {
        let _span = info_span!("snapshot", snap).entered();
        let t0 = Instant::now();

        let hds = headers.headers(snap)?;
        let Some(first) = hds.first() else {
            return Err(HaloError::SnapshotHeader {
                snap,
                reason: "snapshot has no blocks".to_string(),
            });
        };
        let box_width = first.region.box_width;

        let spheres = bounding_spheres(halos, idxs, cfg, box_width);
        let specs: Vec<BinSpec> = idxs
            .iter()
            .zip(&spheres)
            .map(|(&i, s)| BinSpec::for_halo(&halos[i], s.center, cfg, box_width))
            .collect();
        let intr = bin_sphere_intersections(&hds, &spheres);
        pb.set_message(format!(
            "snap={} halos={} blocks={}/{}",
            snap,
            idxs.len(),
            intr.n_relevant_blocks(),
            hds.len()
        ));

        for (hd, intr_idxs) in hds.iter().zip(&intr.block_halos) {
            if intr_idxs.is_empty() {
                continue;
            }
            debug!(block = hd.index, halos = intr_idxs.len(), "reading block");
            let block = read_block(format, hd, snap)?;

            // one partial per halo, merged below; halo order inside a block is irrelevant
            let partials: Vec<(usize, RadialBins)> = intr_idxs
                .par_iter()
                .map(|&j| {
                    let mut part = RadialBins::new(cfg.bins);
                    insert_points(&mut part, &specs[j], &block.positions, &block.masses);
                    (j, part)
                })
                .collect();
            for (j, part) in partials {
                if let Some(acc) = bins[idxs[j]].as_mut() {
                    acc.merge(&part);
                }
            }
        }

        info!(
            halos = idxs.len(),
            blocks = intr.n_relevant_blocks(),
            secs = format_args!("{:.3}", t0.elapsed().as_secs_f64()),
            "snapshot done"
        );
        runtime::check_memory(&format!("snapshot {snap}"), mem_budget)?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(bins)
}

/// Full profile stage: accumulate, then normalize every halo in parallel.
pub fn compute_profiles<H, F>(
    halos: &[HaloRecord],
    cfg: &ProfConfig,
    headers: &H,
    format: &F,
) -> Result<Vec<Option<Profile>>>
where
    H: HeaderProvider,
    F: SnapshotFormat,
{
    let bins = accumulate_catalog(halos, cfg, headers, format)?;
    Ok(bins
        .par_iter()
        .zip(halos)
        .map(|(b, h)| {
            b.as_ref()
                .map(|b| normalize(b, h.r200m * cfg.r_min_mult, h.r200m * cfg.r_max_mult))
        })
        .collect())
}

/// Header line plus one row per halo: `ID Snapshot R[bins] Rho[bins]`.
/// Sentinel rows are passed through as all -1.
pub fn format_profile_table(
    halos: &[HaloRecord],
    profiles: &[Option<Profile>],
    bins: usize,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(halos.len() + 1);
    lines.push(comment_header(
        &["ID", "Snapshot", "R [cMpc/h]", "Rho [h^2 Msun/cMpc^3]"],
        &[1, 1, bins, bins],
    ));
    let sentinel_floats = vec![SENTINEL as f64; 2 * bins];
    for (h, p) in halos.iter().zip(profiles) {
        match p {
            Some(p) => {
                let mut floats = Vec::with_capacity(2 * bins);
                floats.extend_from_slice(&p.radii);
                floats.extend_from_slice(&p.density);
                lines.push(format_row(&[h.id, h.snapshot], &floats));
            }
            None => lines.push(format_row(&[SENTINEL, SENTINEL], &sentinel_floats)),
        }
    }
    lines
}

/// Catalog text in, profile table out.
pub fn profile_catalog<S, F>(
    lines: &[S],
    cfg: &GlobalConfig,
    cache: &HeaderCache,
    format: &F,
) -> Result<Vec<String>>
where
    S: AsRef<str>,
    F: SnapshotFormat,
{
    cfg.validate_for_prof()?;
    let halos = parse_halo_catalog(lines)?;
    info!(halos = halos.len(), format = format.name(), "computing profiles");
    let headers = CachedHeaders {
        cache,
        format,
        cfg: &cfg.snapshots,
    };
    let profiles = compute_profiles(&halos, &cfg.prof, &headers, format)?;
    Ok(format_profile_table(&halos, &profiles, cfg.prof.bins))
}
