//! Utility functions for display formatting.

pub mod format;

pub use format::{avatar_initials, format_date, format_optional, truncate_string};
