//! Model declaration: compartments, flows, rates, stratifications and
//! derived outputs.
mod compartmental;
mod flow;
mod outputs;
mod rate;
mod runtime;
mod stratify;

pub use compartmental::*;
pub use flow::*;
pub use outputs::*;
pub use rate::*;
pub use runtime::*;
pub use stratify::*;
