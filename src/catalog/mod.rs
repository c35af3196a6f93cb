pub mod group;
pub mod text;

pub use group::*;
pub use text::*;
