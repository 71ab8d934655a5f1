//! Recording collaborators shared by the integration tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use porthole::proto::{MsgHeader, HEADER_SIZE};
use porthole::{CompositorHooks, RedrawTimer, Transport};

/// Transport that records every framed message.
pub struct RecordingTransport(pub Rc<RefCell<Vec<Vec<u8>>>>);

impl Transport for RecordingTransport {
    fn send(&mut self, msg: &[u8]) {
        self.0.borrow_mut().push(msg.to_vec());
    }
}

/// Timer that only counts how often it was armed.
pub struct CountingTimer(pub Rc<Cell<u32>>);

impl RedrawTimer for CountingTimer {
    fn arm(&mut self, _delay: Duration) {
        self.0.set(self.0.get() + 1);
    }
}

#[derive(Default)]
pub struct RecordingHooks {
    pub modes: Vec<(u32, u32, u32)>,
    pub enabled: Vec<bool>,
    pub frames: u32,
}

impl CompositorHooks for RecordingHooks {
    fn update_custom_mode(&mut self, width: u32, height: u32, refresh_mhz: u32) {
        self.modes.push((width, height, refresh_mhz));
    }
    fn update_enabled(&mut self, enabled: bool) {
        self.enabled.push(enabled);
    }
    fn send_frame(&mut self) {
        self.frames += 1;
    }
}

pub fn header(msg: &[u8]) -> MsgHeader {
    bytemuck::pod_read_unaligned(&msg[..HEADER_SIZE])
}

pub fn payload<P: bytemuck::Pod>(msg: &[u8]) -> P {
    bytemuck::pod_read_unaligned(&msg[HEADER_SIZE..])
}
