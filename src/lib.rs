//! Density profiles and main-branch histories for halo catalogs drawn from
//! N-body snapshots.

pub mod catalog;
pub mod config;
pub mod error;
pub mod geom;
pub mod profile;
pub mod runtime;
pub mod snapshot;
pub mod tree;

pub use error::{HaloError, Result};
