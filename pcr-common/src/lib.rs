//! # Postal Code Resolver Common Library
//!
//! Shared code for the resolution pipeline and the read-side consumers of its
//! output:
//! - Address and error record models
//! - Postal code normalization
//! - Configuration file loading and output folder resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod models;
pub mod postal_code;
pub mod time;

pub use error::{Error, Result};
pub use models::{AddressRecord, ErrorRecord};
pub use postal_code::{normalize_code, normalize_codes};
