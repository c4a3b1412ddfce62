//!
//! Utility module for display formatting.
//!
/// Amount formatting helpers
pub mod format;

pub use format::{format_fiat, format_token_amount};
