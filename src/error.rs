use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, HaloError>;

/// Every failure aborts the whole run; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum HaloError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid config value for {field}: {reason}")]
    ConfigValidation { field: &'static str, reason: String },

    #[error("could not parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("headers unavailable for snapshot {snap}: {reason}")]
    SnapshotHeader { snap: i64, reason: String },

    #[error("could not read block {path} (snapshot {snap}): {reason}")]
    BlockRead {
        snap: i64,
        path: PathBuf,
        reason: String,
    },

    #[error("no usable tree files in {dir}: {reason}")]
    TreeDiscovery { dir: PathBuf, reason: String },

    #[error("{path}:{line}: {reason}")]
    TreeParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("header cache {dir}: {reason}")]
    MemoCache { dir: PathBuf, reason: String },

    #[error("resident memory {rss_gib:.2} GiB after {stage} exceeds the {limit_gib:.2} GiB limit")]
    MemoryBudget {
        stage: String,
        rss_gib: f64,
        limit_gib: f64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HaloError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        HaloError::ConfigValidation {
            field,
            reason: reason.into(),
        }
    }
}
