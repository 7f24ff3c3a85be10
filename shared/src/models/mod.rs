//! Domain models for the reservoir recommendation engine

mod forecast;
mod recommendation;
mod risk;

pub use forecast::*;
pub use recommendation::*;
pub use risk::*;
