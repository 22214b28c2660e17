//! mdfs-types: shared foundation types for the mdfs metadata service.
//!
//! Provides the `Status`-based error model used across the workspace,
//! the numeric status-code families, and strongly-typed handle ids for
//! cache-owned namespace objects.

#[allow(non_snake_case)]
pub mod status_code;

pub mod result;
pub mod status;

#[macro_use]
pub mod strong_type;

pub mod ids;

// Re-export commonly used items at the crate root.
pub use ids::*;
pub use result::{Result, Void, make_error, make_error_msg};
pub use status::Status;
pub use status_code::*;
