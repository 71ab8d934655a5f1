//! Redraw scheduling shared by all outputs.
//!
//! When a composition pass reports pending content, exactly one short timer
//! is armed process-wide; its firing drives the next redraw pass. The
//! `frame_pending` flag deduplicates scheduling and is owned here
//! exclusively: it is set on the first pending frame of a cycle and cleared
//! exactly once, when the timer fires.

use std::time::Duration;

use tracing::trace;

/// One-shot timer armed by the scheduler. Once armed it always fires; the
/// bridge never cancels it.
pub trait RedrawTimer {
    fn arm(&mut self, delay: Duration);
}

pub struct FrameScheduler {
    timer: Box<dyn RedrawTimer>,
    interval: Duration,
    frame_pending: bool,
}

impl FrameScheduler {
    pub fn new(timer: Box<dyn RedrawTimer>, interval: Duration) -> Self {
        Self {
            timer,
            interval,
            frame_pending: false,
        }
    }

    /// A composition pass produced content that still needs a redraw pass.
    /// Arms the timer unless one is already outstanding.
    pub fn note_pending(&mut self) {
        if self.frame_pending {
            return;
        }
        trace!(interval = ?self.interval, "scheduling redraw timer");
        self.timer.arm(self.interval);
        self.frame_pending = true;
    }

    /// The armed timer fired. Clears the pending flag; the caller runs the
    /// redraw pass.
    pub fn on_timer_fired(&mut self) {
        self.frame_pending = false;
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }
}
