//! Shared terminal UI pieces.

pub mod error;

pub use error::report_fatal;
