mod table_tracker;
mod tracker;

pub use table_tracker::*;
pub use tracker::*;
