//! Audio side of a recording session.
//!
//! Provides device access, the capture pipeline that feeds the session, take
//! playback, and the session screen with its waveform.

pub mod audio;
pub mod pipeline;
pub mod playback;
pub mod ui;
pub mod visualizations;

pub use audio::CpalDevice;
pub use pipeline::{CapturePipeline, PipelineConfig};
pub use playback::Playback;
pub use ui::{FrameInfo, SessionTui, UiCommand};
