use rayon::ThreadPoolBuilder;
use std::sync::Once;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::{HaloError, Result};

struct ThreadConfig {
    count: usize,
    source: String,
}

fn parse_env_threads(keys: &[&str]) -> Option<ThreadConfig> {
    for &key in keys {
        if let Ok(v) = std::env::var(key) {
            if let Ok(val) = v.parse::<usize>() {
                if val > 0 {
                    return Some(ThreadConfig {
                        count: val,
                        source: key.to_string(),
                    });
                }
            }
        }
    }
    None
}

fn detect_thread_config(requested: usize) -> ThreadConfig {
    if requested > 0 {
        return ThreadConfig {
            count: requested,
            source: "config".to_string(),
        };
    }

    const ENV_HINTS: [&str; 5] = [
        "RAYON_NUM_THREADS",
        "SLURM_CPUS_PER_TASK",
        "SLURM_CPUS_ON_NODE",
        "PBS_NP",
        "OMP_NUM_THREADS",
    ];

    if let Some(cfg) = parse_env_threads(&ENV_HINTS) {
        return cfg;
    }

    let fallback = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1);

    ThreadConfig {
        count: fallback,
        source: "available_parallelism".to_string(),
    }
}

/// Sizes the global rayon pool once. `requested == 0` means detect.
pub fn configure_thread_pool(requested: usize) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let cfg = detect_thread_config(requested);
        match ThreadPoolBuilder::new()
            .num_threads(cfg.count)
            .thread_name(|i| format!("haloprof-worker-{i}"))
            .build_global()
        {
            Ok(_) => {
                info!(threads = cfg.count, hint = %cfg.source, "rayon pool configured");
            }
            Err(err) => {
                warn!(error = %err, "failed to configure rayon pool; continuing with default");
            }
        }
    });
}

/// stderr logging; stdout carries the output catalog.
/// Filter from `HALOPROF_LOG`, then `RUST_LOG`, default `info`.
pub fn init_logging() {
    let filter = std::env::var("HALOPROF_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// resident-memory budget from HALOPROF_MAX_RSS_{BYTES,MB,GB}
const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

fn parse_budget_var(var: &str, multiplier: u64) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    raw.trim()
        .parse::<u64>()
        .ok()
        .map(|v| v.saturating_mul(multiplier))
}

pub fn memory_budget_bytes() -> Option<u64> {
    parse_budget_var("HALOPROF_MAX_RSS_BYTES", 1)
        .or_else(|| parse_budget_var("HALOPROF_MAX_RSS_MB", MB))
        .or_else(|| parse_budget_var("HALOPROF_MAX_RSS_GB", GB))
}

pub fn current_rss_bytes() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/self/statm").ok()?;
    let mut parts = contents.split_whitespace();
    let _total = parts.next()?;
    let resident_pages: u64 = parts.next()?.parse().ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages.saturating_mul(page_size as u64))
}

fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / GB as f64
}

/// Logs resident memory after `stage` and fails if it is over `budget`.
pub fn check_memory(stage: &str, budget: Option<u64>) -> Result<()> {
    let Some(rss) = current_rss_bytes() else {
        return Ok(());
    };
    match budget {
        Some(limit) => {
            info!(
                stage,
                rss_gib = format_args!("{:.2}", bytes_to_gib(rss)),
                limit_gib = format_args!("{:.2}", bytes_to_gib(limit)),
                "memory"
            );
            if rss > limit {
                return Err(HaloError::MemoryBudget {
                    stage: stage.to_string(),
                    rss_gib: bytes_to_gib(rss),
                    limit_gib: bytes_to_gib(limit),
                });
            }
        }
        None => {
            info!(stage, rss_gib = format_args!("{:.2}", bytes_to_gib(rss)), "memory");
        }
    }
    Ok(())
}
