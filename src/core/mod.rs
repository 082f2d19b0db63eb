//! Core traits, types, and constants.
//!
//! This module has no optional dependencies and defines the abstractions the
//! rest of the crate is written against.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
