//! Window lifecycle state machine.
//!
//! One [`Output`] mirrors one compositor-managed drawable surface to the
//! remote GUI daemon as one window. All wire messages for that window are
//! emitted here, in response to commit/configure/map/unmap/destroy events
//! arriving from the compositor framework or from the legacy-X
//! compatibility layer. The daemon never hears about a window before its
//! CREATE and never after its DESTROY.

use std::cell::RefCell;
use std::num::NonZeroU32;
use std::rc::Rc;

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, warn};

use crate::buffer::{BufferSlot, PendingBuffer};
use crate::config::OutputConfig;
use crate::damage::{self, DamageBox};
use crate::frame::FrameScheduler;
use crate::geometry::Geometry;
use crate::link::{GuiLink, IdExhausted};
use crate::proto::{self, Configure, Create, MapInfo, WindowFlag, WindowFlags};

bitflags! {
    /// Lifecycle flag set of one output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OutputFlags: u32 {
        /// CREATE has been sent for this window.
        const CREATED              = 1 << 0;
        /// The window is currently mapped.
        const MAPPED               = 1 << 1;
        /// Window bypasses normal placement/decoration policy.
        const OVERRIDE_REDIRECT    = 1 << 2;
        /// Client-driven resizes are not forwarded to the daemon.
        const IGNORE_CLIENT_RESIZE = 1 << 3;
    }
}

/// Which concrete owning context backs this output: a native-shell surface
/// or a legacy-X one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Shell,
    Xwayland,
}

/// Acknowledgements the bridge sends back into the compositor framework.
pub trait CompositorHooks {
    /// The output adopted a new custom mode.
    fn update_custom_mode(&mut self, width: u32, height: u32, refresh_mhz: u32);
    /// The output was enabled or disabled.
    fn update_enabled(&mut self, enabled: bool);
    /// A frame may be rendered; drives the framework's render pipeline.
    fn send_frame(&mut self);
}

/// A size + refresh declaration for the virtual output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomMode {
    pub width: u32,
    pub height: u32,
    pub refresh_mhz: u32,
}

/// The batch of pending changes one compositor commit applies. `None`
/// fields are not part of this commit.
#[derive(Clone, Default)]
pub struct PendingState {
    pub mode: Option<CustomMode>,
    pub buffer: Option<PendingBuffer>,
    pub enabled: Option<bool>,
    /// Dirty region accumulated since the last announced frame; consumed
    /// once, not retained.
    pub damage: Vec<DamageBox>,
}

#[derive(Debug, Error)]
pub enum CommitError {
    /// The pending buffer is of an implementation this bridge does not
    /// understand. Nothing was mutated; the framework may retry.
    #[error("pending buffer is not a grant-backed buffer")]
    IncompatibleBuffer,
    /// Fatal for this window only; the owning surface must be torn down.
    #[error(transparent)]
    Ids(#[from] IdExhausted),
}

pub struct Output {
    kind: OutputKind,
    link: Rc<RefCell<GuiLink>>,
    window_id: Option<NonZeroU32>,
    x: i32,
    y: i32,
    /// Size most recently communicated to the daemon, not the compositor's
    /// pending one.
    last_width: u32,
    last_height: u32,
    flags: OutputFlags,
    buffer: BufferSlot,
    destroyed: bool,
    refresh_mhz: u32,
    max_width: u32,
    max_height: u32,
}

impl Output {
    pub fn new(
        kind: OutputKind,
        link: Rc<RefCell<GuiLink>>,
        config: &OutputConfig,
        override_redirect: bool,
        hooks: &mut dyn CompositorHooks,
    ) -> Self {
        hooks.update_custom_mode(config.initial_width, config.initial_height, 0);
        hooks.update_enabled(true);
        let flags = if override_redirect {
            OutputFlags::OVERRIDE_REDIRECT
        } else {
            OutputFlags::empty()
        };
        debug!(?kind, override_redirect, "virtual output created");
        Self {
            kind,
            link,
            window_id: None,
            x: 0,
            y: 0,
            last_width: 0,
            last_height: 0,
            flags,
            buffer: BufferSlot::new(),
            destroyed: false,
            refresh_mhz: config.refresh_mhz,
            max_width: config.max_width,
            max_height: config.max_height,
        }
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn created(&self) -> bool {
        self.flags.contains(OutputFlags::CREATED)
    }

    pub fn mapped(&self) -> bool {
        self.flags.contains(OutputFlags::MAPPED)
    }

    pub fn window_id(&self) -> Option<NonZeroU32> {
        self.window_id
    }

    pub fn flags(&self) -> OutputFlags {
        self.flags
    }

    pub fn set_ignore_client_resize(&mut self, ignore: bool) {
        self.flags.set(OutputFlags::IGNORE_CLIENT_RESIZE, ignore);
    }

    fn wire_id(&self) -> u32 {
        self.window_id.map(NonZeroU32::get).unwrap_or(0)
    }

    /// Announce this window to the daemon if it has not been announced yet.
    /// Allocates the window identifier lazily on first need.
    pub fn ensure_created(&mut self, geo: Geometry) -> Result<(), IdExhausted> {
        debug_assert!(!self.destroyed, "operation on destroyed output");
        if self.created() {
            return Ok(());
        }
        self.x = geo.x;
        self.y = geo.y;
        if self.window_id.is_none() {
            self.window_id = Some(self.link.borrow_mut().allocate_id()?);
        }
        let wid = self.wire_id();
        debug!("Sending MSG_CREATE (0x{:x}) to window {}", proto::MSG_CREATE, wid);
        let msg = proto::encode(
            wid,
            &Create {
                x: geo.x,
                y: geo.y,
                width: geo.width,
                height: geo.height,
                parent: 0,
                override_redirect: self.flags.contains(OutputFlags::OVERRIDE_REDIRECT) as u8,
            },
        );
        self.link.borrow_mut().send(&msg);
        self.flags |= OutputFlags::CREATED;
        Ok(())
    }

    /// Commit-test: accept unless the pending buffer is of a foreign
    /// implementation. The only validation performed at test time.
    pub fn test(&self, pending: &PendingState) -> bool {
        match &pending.buffer {
            Some(buffer) => buffer.as_grant().is_some(),
            None => true,
        }
    }

    /// Apply one compositor commit. Rejection happens before any mutation;
    /// once the buffer-kind check passes the commit cannot fail except on
    /// identifier exhaustion at first creation.
    pub fn commit(
        &mut self,
        pending: &PendingState,
        hooks: &mut dyn CompositorHooks,
    ) -> Result<(), CommitError> {
        debug_assert!(!self.destroyed, "commit on destroyed output");
        if !self.test(pending) {
            return Err(CommitError::IncompatibleBuffer);
        }

        let (width, height) = match pending.mode {
            Some(mode) => (mode.width, mode.height),
            None => (self.last_width, self.last_height),
        };
        self.ensure_created(Geometry::new(self.x, self.y, width, height))?;

        if let Some(mode) = pending.mode {
            hooks.update_custom_mode(mode.width, mode.height, mode.refresh_mhz);
        }

        if let Some(PendingBuffer::Grant(new_buffer)) = &pending.buffer {
            if !self.buffer.holds(new_buffer) {
                self.buffer.attach(new_buffer.clone());
                self.dump_buffer(&pending.damage);
            }
        }

        if let Some(enabled) = pending.enabled {
            hooks.update_enabled(enabled);
        }
        Ok(())
    }

    /// External resize/reposition request, from the legacy-X compatibility
    /// layer or the shell protocol. Always concludes with a frame signal:
    /// the render pipeline is driven by frame signals, not by the daemon's
    /// acknowledgement.
    pub fn configure(
        &mut self,
        geo: Geometry,
        hooks: &mut dyn CompositorHooks,
    ) -> Result<(), IdExhausted> {
        debug_assert!(!self.destroyed, "configure on destroyed output");
        if !geo.in_bounds(self.max_width, self.max_height) {
            warn!(
                width = geo.width,
                height = geo.height,
                "dropping configure with out-of-range geometry"
            );
            return Ok(());
        }
        self.x = geo.x;
        self.y = geo.y;
        self.ensure_created(geo)?;
        if (self.last_width != geo.width || self.last_height != geo.height)
            && !self.flags.contains(OutputFlags::IGNORE_CLIENT_RESIZE)
        {
            self.send_configure(geo.width, geo.height);
            debug!(
                "Resized window {}: old size {} {}, new size {} {}",
                self.wire_id(),
                self.last_width,
                self.last_height,
                geo.width,
                geo.height
            );
            hooks.update_custom_mode(geo.width, geo.height, self.refresh_mhz);
            self.last_width = geo.width;
            self.last_height = geo.height;
        }
        hooks.send_frame();
        Ok(())
    }

    /// Map the window, announcing it first if needed. Idempotent while
    /// mapped.
    pub fn map(&mut self, geo: Geometry) -> Result<(), IdExhausted> {
        debug_assert!(!self.destroyed, "map on destroyed output");
        if !geo.in_bounds(self.max_width, self.max_height) {
            warn!(
                width = geo.width,
                height = geo.height,
                "dropping map with out-of-range geometry"
            );
            return Ok(());
        }
        self.ensure_created(geo)?;
        if !self.mapped() {
            let wid = self.wire_id();
            debug!("Sending MSG_MAP (0x{:x}) to window {}", proto::MSG_MAP, wid);
            let msg = proto::encode(
                wid,
                &MapInfo {
                    transient_for: 0,
                    override_redirect: self.flags.contains(OutputFlags::OVERRIDE_REDIRECT) as u8,
                },
            );
            self.link.borrow_mut().send(&msg);
            self.flags |= OutputFlags::MAPPED;
        }
        Ok(())
    }

    /// Hide the window. Idempotent; the output stays created and can be
    /// mapped again.
    pub fn unmap(&mut self, hooks: &mut dyn CompositorHooks) {
        debug_assert!(!self.destroyed, "unmap on destroyed output");
        self.flags.remove(OutputFlags::MAPPED);
        hooks.update_enabled(false);
        if self.created() {
            let wid = self.wire_id();
            debug!("Sending MSG_UNMAP (0x{:x}) to window {}", proto::MSG_UNMAP, wid);
            self.link
                .borrow_mut()
                .send(&proto::encode_empty(proto::MSG_UNMAP, wid));
        }
    }

    /// Announce a window manager flag transition. Calling this before the
    /// window exists on the daemon side is a programming error.
    pub fn set_flags(&mut self, set: WindowFlag, clear: WindowFlag) {
        debug_assert!(self.created(), "window flags are meaningless before creation");
        if !self.created() {
            return;
        }
        let wid = self.wire_id();
        debug!(
            "Sending MSG_WINDOW_FLAGS (0x{:x}) to window {}",
            proto::MSG_WINDOW_FLAGS,
            wid
        );
        let msg = proto::encode(
            wid,
            &WindowFlags {
                flags_set: set.bits(),
                flags_unset: clear.bits(),
            },
        );
        self.link.borrow_mut().send(&msg);
    }

    /// Tear the window down: DESTROY on the wire (if it was ever created),
    /// identifier released, buffer reference dropped. Called exactly once.
    pub fn destroy(&mut self) {
        debug_assert!(!self.destroyed, "output destroyed twice");
        if self.destroyed {
            return;
        }
        if self.created() {
            let wid = self.wire_id();
            debug!("Sending MSG_DESTROY (0x{:x}) to window {}", proto::MSG_DESTROY, wid);
            self.link
                .borrow_mut()
                .send(&proto::encode_empty(proto::MSG_DESTROY, wid));
            if let Some(id) = self.window_id.take() {
                self.link.borrow_mut().release_id(id);
            }
        }
        self.buffer.detach();
        self.flags = OutputFlags::empty();
        self.destroyed = true;
    }

    /// Frame-completion notification from the framework.
    pub fn handle_frame(
        &mut self,
        content_committed: bool,
        hooks: &mut dyn CompositorHooks,
        scheduler: &mut FrameScheduler,
    ) {
        // Re-anchor the framework's mode bookkeeping to the last size
        // actually communicated. Without this, fast resizes desynchronize
        // the declared mode from the committed size and parts of the window
        // are never rendered until the next resize.
        hooks.update_custom_mode(self.last_width, self.last_height, self.refresh_mhz);
        match self.kind {
            OutputKind::Shell => {
                if content_committed {
                    scheduler.note_pending();
                }
            }
            OutputKind::Xwayland => {}
        }
    }

    fn send_configure(&mut self, width: u32, height: u32) {
        if !self.created() {
            return;
        }
        let wid = self.wire_id();
        debug!("Sending MSG_CONFIGURE (0x{:x}) to window {}", proto::MSG_CONFIGURE, wid);
        let msg = proto::encode(
            wid,
            &Configure {
                x: self.x,
                y: self.y,
                width,
                height,
                // Ignored by the daemon in MSG_CONFIGURE.
                override_redirect: 0,
            },
        );
        self.link.borrow_mut().send(&msg);
    }

    /// Describe the freshly committed buffer to the daemon, then the
    /// damaged region of it.
    fn dump_buffer(&mut self, rects: &[DamageBox]) {
        let Some(buffer) = self.buffer.current() else {
            return;
        };
        let wid = self.wire_id();
        debug!("Sending MSG_WINDOW_DUMP (0x{:x}) to window {}", proto::MSG_WINDOW_DUMP, wid);
        let msg = buffer.dump_message(wid);
        self.link.borrow_mut().send(&msg);
        self.send_damage(rects);
    }

    fn send_damage(&mut self, rects: &[DamageBox]) {
        if rects.is_empty() {
            debug!("No damage!");
            return;
        }
        let wid = self.wire_id();
        match damage::extract(rects) {
            Ok(images) => {
                debug!("Sending MSG_SHMIMAGE (0x{:x}) to window {}", proto::MSG_SHMIMAGE, wid);
                for image in images {
                    self.link.borrow_mut().send(&proto::encode(wid, &image));
                }
            }
            // Logged in the extractor; damage re-accumulates next commit.
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::GrantBuffer;
    use crate::link::{SequentialIds, Transport};
    use crate::proto::{MsgHeader, HEADER_SIZE, PAGE_SIZE};

    struct RecordingTransport(Rc<RefCell<Vec<Vec<u8>>>>);

    impl Transport for RecordingTransport {
        fn send(&mut self, msg: &[u8]) {
            self.0.borrow_mut().push(msg.to_vec());
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        modes: Vec<(u32, u32, u32)>,
        enabled: Vec<bool>,
        frames: u32,
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

    fn make_output(kind: OutputKind) -> (Output, Rc<RefCell<Vec<Vec<u8>>>>, RecordingHooks) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let link = Rc::new(RefCell::new(GuiLink::new(
            Box::new(RecordingTransport(sent.clone())),
            Box::new(SequentialIds::new()),
        )));
        let mut hooks = RecordingHooks::default();
        let output = Output::new(kind, link, &OutputConfig::default(), false, &mut hooks);
        (output, sent, hooks)
    }

    fn kinds(sent: &Rc<RefCell<Vec<Vec<u8>>>>) -> Vec<u32> {
        sent.borrow()
            .iter()
            .map(|m| {
                let header: MsgHeader = bytemuck::pod_read_unaligned(&m[..HEADER_SIZE]);
                header.kind
            })
            .collect()
    }

    fn grant_buffer(pages: usize) -> Rc<GrantBuffer> {
        GrantBuffer::new(800, 600, pages * PAGE_SIZE, (0..pages as u32).collect())
    }

    #[test]
    fn create_precedes_everything_and_happens_once() {
        let (mut output, sent, mut hooks) = make_output(OutputKind::Shell);
        let geo = Geometry::new(0, 0, 800, 600);

        output.configure(geo, &mut hooks).unwrap();
        output.ensure_created(geo).unwrap();
        assert_eq!(kinds(&sent)[0], proto::MSG_CREATE);
        assert_eq!(
            kinds(&sent).iter().filter(|k| **k == proto::MSG_CREATE).count(),
            1
        );
    }

    #[test]
    fn destroy_only_after_create_and_at_most_once() {
        let (mut output, sent, _hooks) = make_output(OutputKind::Shell);

        // Never created: no DESTROY on the wire.
        output.destroy();
        assert!(kinds(&sent).is_empty());

        let (mut output, sent, mut hooks) = make_output(OutputKind::Shell);
        output
            .configure(Geometry::new(0, 0, 100, 100), &mut hooks)
            .unwrap();
        output.destroy();
        let k = kinds(&sent);
        assert_eq!(k.iter().filter(|k| **k == proto::MSG_DESTROY).count(), 1);
        assert_eq!(*k.last().unwrap(), proto::MSG_DESTROY);
        assert!(output.window_id().is_none());
    }

    #[test]
    fn configure_is_idempotent_on_unchanged_size() {
        let (mut output, sent, mut hooks) = make_output(OutputKind::Xwayland);
        let geo = Geometry::new(0, 0, 640, 480);

        output.configure(geo, &mut hooks).unwrap();
        let after_first = kinds(&sent);
        assert_eq!(after_first, vec![proto::MSG_CREATE, proto::MSG_CONFIGURE]);

        output.configure(geo, &mut hooks).unwrap();
        assert_eq!(kinds(&sent), after_first);
        assert_eq!(hooks.frames, 2);
    }

    #[test]
    fn ignore_client_resize_suppresses_configure_but_not_frames() {
        let (mut output, sent, mut hooks) = make_output(OutputKind::Xwayland);
        output.set_ignore_client_resize(true);

        output
            .configure(Geometry::new(0, 0, 300, 200), &mut hooks)
            .unwrap();
        output
            .configure(Geometry::new(0, 0, 500, 400), &mut hooks)
            .unwrap();
        assert_eq!(kinds(&sent), vec![proto::MSG_CREATE]);
        assert_eq!(hooks.frames, 2);
    }

    #[test]
    fn out_of_range_geometry_is_dropped_without_frame() {
        let (mut output, sent, mut hooks) = make_output(OutputKind::Xwayland);
        output
            .configure(Geometry::new(0, 0, 0, 200), &mut hooks)
            .unwrap();
        output
            .configure(
                Geometry::new(0, 0, proto::MAX_WINDOW_WIDTH + 1, 200),
                &mut hooks,
            )
            .unwrap();
        assert!(kinds(&sent).is_empty());
        assert_eq!(hooks.frames, 0);
    }

    #[test]
    fn foreign_buffer_commit_is_rejected_without_side_effects() {
        let (mut output, sent, mut hooks) = make_output(OutputKind::Shell);
        let pending = PendingState {
            mode: Some(CustomMode { width: 800, height: 600, refresh_mhz: 60_000 }),
            buffer: Some(PendingBuffer::Foreign("gbm-bo")),
            enabled: Some(true),
            damage: vec![DamageBox { x1: 0, y1: 0, x2: 8, y2: 8 }],
        };
        assert!(!output.test(&pending));
        assert!(matches!(
            output.commit(&pending, &mut hooks),
            Err(CommitError::IncompatibleBuffer)
        ));
        assert!(kinds(&sent).is_empty());
        assert!(!output.created());
        // new() declared the initial mode + enable; the rejected commit
        // added nothing.
        assert_eq!(hooks.modes.len(), 1);
        assert_eq!(hooks.enabled.len(), 1);
    }

    #[test]
    fn commit_with_new_buffer_dumps_then_damages() {
        let (mut output, sent, mut hooks) = make_output(OutputKind::Shell);
        output
            .ensure_created(Geometry::new(0, 0, 800, 600))
            .unwrap();

        let pending = PendingState {
            mode: None,
            buffer: Some(PendingBuffer::Grant(grant_buffer(2))),
            enabled: None,
            damage: vec![DamageBox { x1: 10, y1: 10, x2: 50, y2: 50 }],
        };
        output.commit(&pending, &mut hooks).unwrap();
        assert_eq!(
            kinds(&sent),
            vec![proto::MSG_CREATE, proto::MSG_WINDOW_DUMP, proto::MSG_SHMIMAGE]
        );

        // Re-committing the same buffer does not re-dump.
        output.commit(&pending, &mut hooks).unwrap();
        assert_eq!(kinds(&sent).len(), 3);
    }

    #[test]
    fn map_is_idempotent_and_unmap_disables_output() {
        let (mut output, sent, mut hooks) = make_output(OutputKind::Xwayland);
        let geo = Geometry::new(5, 5, 320, 240);

        output.map(geo).unwrap();
        output.map(geo).unwrap();
        assert_eq!(kinds(&sent), vec![proto::MSG_CREATE, proto::MSG_MAP]);
        assert!(output.mapped());

        output.unmap(&mut hooks);
        output.unmap(&mut hooks);
        assert!(!output.mapped());
        assert_eq!(
            kinds(&sent),
            vec![
                proto::MSG_CREATE,
                proto::MSG_MAP,
                proto::MSG_UNMAP,
                proto::MSG_UNMAP
            ]
        );
        assert_eq!(hooks.enabled.last(), Some(&false));

        // Remappable after unmap; creation state was retained.
        output.map(geo).unwrap();
        assert!(output.mapped());
        assert_eq!(
            kinds(&sent).iter().filter(|k| **k == proto::MSG_CREATE).count(),
            1
        );
    }

    #[test]
    fn window_flags_transition() {
        let (mut output, sent, mut hooks) = make_output(OutputKind::Shell);
        output
            .configure(Geometry::new(0, 0, 100, 100), &mut hooks)
            .unwrap();
        output.set_flags(WindowFlag::FULLSCREEN, WindowFlag::MINIMIZE);

        let msgs = sent.borrow();
        let last = msgs.last().unwrap();
        let header: MsgHeader = bytemuck::pod_read_unaligned(&last[..HEADER_SIZE]);
        assert_eq!(header.kind, proto::MSG_WINDOW_FLAGS);
        let payload: WindowFlags = bytemuck::pod_read_unaligned(&last[HEADER_SIZE..]);
        assert_eq!(payload.flags_set, WindowFlag::FULLSCREEN.bits());
        assert_eq!(payload.flags_unset, WindowFlag::MINIMIZE.bits());
    }

    #[test]
    fn frame_notification_repins_last_communicated_mode() {
        let (mut output, _sent, mut hooks) = make_output(OutputKind::Shell);
        output
            .configure(Geometry::new(0, 0, 1000, 600), &mut hooks)
            .unwrap();

        let armed = Rc::new(std::cell::Cell::new(0u32));
        struct T(Rc<std::cell::Cell<u32>>);
        impl crate::frame::RedrawTimer for T {
            fn arm(&mut self, _d: std::time::Duration) {
                self.0.set(self.0.get() + 1);
            }
        }
        let mut scheduler = FrameScheduler::new(
            Box::new(T(armed.clone())),
            std::time::Duration::from_millis(16),
        );

        hooks.modes.clear();
        output.handle_frame(true, &mut hooks, &mut scheduler);
        output.handle_frame(true, &mut hooks, &mut scheduler);
        assert_eq!(hooks.modes, vec![(1000, 600, 60_000), (1000, 600, 60_000)]);
        // Pending flag deduplicates the timer.
        assert_eq!(armed.get(), 1);

        // Xwayland outputs never schedule the redraw timer.
        let (mut xw, _sent, mut hooks) = make_output(OutputKind::Xwayland);
        scheduler.on_timer_fired();
        xw.handle_frame(true, &mut hooks, &mut scheduler);
        assert_eq!(armed.get(), 1);
    }
}
