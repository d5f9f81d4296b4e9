//! Lore core crate - shared document model, error type, and configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::LoreConfig;
pub use error::{LoreError, Result};
pub use types::*;
