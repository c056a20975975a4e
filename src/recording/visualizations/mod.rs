//! Audio pane state and drawing helpers.
//!
//! `window` tracks which part of the recording is on screen and turns mouse
//! gestures into window and selection changes; `waveform` reduces the visible
//! samples to one min/max envelope per column.

pub mod waveform;
pub mod window;

pub use waveform::envelope;
pub use window::{AudioView, Zoom};
