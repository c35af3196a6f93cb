pub mod accumulate;
pub mod driver;
pub mod intersect;
pub mod normalize;

pub use accumulate::*;
pub use driver::*;
pub use intersect::*;
pub use normalize::*;
