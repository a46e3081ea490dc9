//! Core types for Dirauth

mod entry;
mod provision;
mod scope;

pub use entry::*;
pub use provision::*;
pub use scope::*;
