//! Domain models for the rx-lens system.

mod medication;
mod prescription;
mod reminder;
mod resolution;

pub use medication::*;
pub use prescription::*;
pub use reminder::*;
pub use resolution::*;
