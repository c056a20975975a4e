//! Application command handlers for taketrack.
//!
//! # Commands
//! - `record`: Interactive recording session against a script
//! - `list_devices`: List available audio capture and playback devices
//! - `logs`: Display recent log entries

pub mod list_devices;
pub mod logs;
pub mod record;

pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use record::handle_record;
