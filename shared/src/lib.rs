//! Shared types and pure domain logic for the reservoir recommendation engine
//!
//! This crate contains the forecast and recommendation data model, risk
//! classification and the rule-based template recommender. Nothing in here
//! performs I/O.

pub mod models;
pub mod template;
pub mod types;
pub mod validation;

pub use models::*;
pub use template::*;
pub use types::*;
pub use validation::*;
