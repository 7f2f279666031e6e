//! Common utilities and types shared across the sentinel crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
