pub mod discover;
pub mod forest;
pub mod history;

pub use discover::*;
pub use forest::*;
pub use history::*;
