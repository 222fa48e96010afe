//! Request handlers for snapshot transfer.

mod export;
mod import;

pub use export::*;
pub use import::*;
