mod reproduction;

pub use reproduction::*;
