//! The time window shown in the audio pane, and the mouse gestures that move it.
//!
//! Positions are display columns relative to the left edge of the pane. The
//! window can follow the end of the recording, zoom around its centre, pan, and
//! carry a click-drag selection.

use crate::document::TimeSpan;
use std::time::Duration;

/// Shortest window shown once at least that much audio exists.
pub const MIN_WINDOW: Duration = Duration::from_secs(1);

/// Each zoom step moves both edges by this fraction of the window.
const ZOOM_STEP_DIVISOR: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zoom {
    In,
    Out,
}

#[derive(Debug, Clone)]
pub struct AudioView {
    window: TimeSpan,
    stick_to_end: bool,
    width: u16,
    selection: Option<TimeSpan>,
    /// Column and time where the current selection gesture began
    anchor: Option<(u16, Duration)>,
    /// Last column seen during a pan gesture
    pan_from: Option<u16>,
}

impl Default for AudioView {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AudioView {
    pub fn new(width: u16) -> Self {
        Self {
            window: TimeSpan::default(),
            stick_to_end: true,
            width,
            selection: None,
            anchor: None,
            pan_from: None,
        }
    }

    pub fn window(&self) -> TimeSpan {
        self.window
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn set_width(&mut self, width: u16) {
        self.width = width;
    }

    pub fn stick_to_end(&self) -> bool {
        self.stick_to_end
    }

    pub fn toggle_stick_to_end(&mut self) {
        self.stick_to_end = !self.stick_to_end;
        tracing::debug!("Stick to end: {}", self.stick_to_end);
    }

    pub fn selection(&self) -> Option<TimeSpan> {
        self.selection
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
        self.anchor = None;
    }

    /// Follows the end of the recording when sticking to it.
    pub fn refresh(&mut self, recorded: Duration) {
        if !self.stick_to_end {
            return;
        }
        let TimeSpan { start, end } = self.window;
        let (start, end) = if recorded >= end {
            let shift = recorded - end;
            (start + shift, recorded)
        } else {
            (start.saturating_sub(end - recorded), recorded)
        };
        self.window = if end - start.min(end) < MIN_WINDOW {
            TimeSpan::new(end.saturating_sub(MIN_WINDOW), end)
        } else {
            TimeSpan::new(start, end)
        };
    }

    /// Narrows or widens the window by a tenth on each side, kept inside the recording.
    pub fn zoom(&mut self, zoom: Zoom, recorded: Duration) {
        let step = self.window.duration() / ZOOM_STEP_DIVISOR;
        let TimeSpan { start, end } = self.window;
        let (start, end) = match zoom {
            Zoom::In => (start + step, end.saturating_sub(step)),
            Zoom::Out => (start.saturating_sub(step), end + step),
        };
        let end = end.min(recorded);
        self.window = TimeSpan::new(start.min(end), end);
    }

    /// Time under display column `x`.
    pub fn pixel_to_time(&self, x: u16) -> Duration {
        if self.width == 0 {
            return self.window.start;
        }
        let nanos = self.window.duration().as_nanos() * x as u128 / self.width as u128;
        self.window.start + Duration::from_nanos(nanos as u64)
    }

    /// Display column showing time `t`, or `None` when `t` is outside the window.
    pub fn time_to_pixel(&self, t: Duration) -> Option<u16> {
        let duration = self.window.duration();
        if duration.is_zero() || !self.window.contains(t) {
            return None;
        }
        let offset = (t - self.window.start).as_nanos();
        let x = offset * self.width as u128 / duration.as_nanos();
        Some((x as u16).min(self.width.saturating_sub(1)))
    }

    /// Left button down: starts a new, empty selection.
    pub fn press(&mut self, x: u16) {
        let t = self.pixel_to_time(x);
        self.anchor = Some((x, t));
        self.selection = Some(TimeSpan::new(t, t));
    }

    /// Left button drag: stretches the selection from the anchor to `x`.
    pub fn drag(&mut self, x: u16) {
        let Some((anchor_x, anchor_t)) = self.anchor else {
            return;
        };
        let t = self.pixel_to_time(x);
        self.selection = Some(if x < anchor_x {
            TimeSpan::new(t, anchor_t)
        } else {
            TimeSpan::new(anchor_t, t)
        });
    }

    /// Button release. Releasing where the press happened clears the selection.
    pub fn release(&mut self, x: u16) {
        if let Some((anchor_x, _)) = self.anchor.take() {
            if anchor_x == x {
                self.selection = None;
            }
        }
        self.pan_from = None;
    }

    /// Middle-button drag: shifts the window by the time under the moved columns.
    ///
    /// Moves that would leave `[0, recorded]` are ignored.
    pub fn pan(&mut self, x: u16, recorded: Duration) {
        let Some(from) = self.pan_from.replace(x) else {
            return;
        };
        if from == x || self.width == 0 {
            return;
        }
        let per_column = self.window.duration() / self.width as u32;
        let delta = per_column * from.abs_diff(x) as u32;
        let TimeSpan { start, end } = self.window;
        if x > from {
            if start >= delta {
                self.window = TimeSpan::new(start - delta, end - delta);
            }
        } else if end + delta <= recorded {
            self.window = TimeSpan::new(start + delta, end + delta);
        }
    }
}
