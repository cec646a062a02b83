//! wikiseek-core - Core types and traits for the wikiseek retrieval engine
//!
//! This crate provides the foundational types, capability traits, error
//! handling, and configuration used throughout the wikiseek system.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{Result, WikiseekError};
pub use traits::*;
pub use types::*;
