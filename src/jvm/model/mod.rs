//! Classes and methods, as far as the linearizer cares about them

mod class;
mod method;

pub use class::*;
pub use method::*;
