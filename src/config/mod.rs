//! Configuration management for taketrack.
//!
//! Loads the TOML configuration from the user's config directory, creating a
//! default file on first run.

pub mod file;

pub use file::{AudioConfig, TakeTrackConfig};
