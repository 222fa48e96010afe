//! Capability checks for the transfer endpoints.

mod middleware;

pub use middleware::*;
