//! Top-level bridge state: the tracked-outputs collection and the shared
//! pieces every output uses (daemon link, redraw scheduler, configuration).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::Config;
use crate::frame::{FrameScheduler, RedrawTimer};
use crate::link::{GuiLink, Transport, WindowIdAllocator};
use crate::output::{CompositorHooks, Output, OutputKind};

/// Handle naming one tracked output within the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputHandle(u64);

pub struct Bridge {
    link: Rc<RefCell<GuiLink>>,
    scheduler: FrameScheduler,
    config: Config,
    outputs: HashMap<OutputHandle, Output>,
    next_handle: u64,
}

impl Bridge {
    pub fn new(
        transport: Box<dyn Transport>,
        ids: Box<dyn WindowIdAllocator>,
        timer: Box<dyn RedrawTimer>,
        config: Config,
    ) -> Self {
        let interval: Duration = config.redraw.timer_interval();
        info!("output bridge initialized");
        Self {
            link: Rc::new(RefCell::new(GuiLink::new(transport, ids))),
            scheduler: FrameScheduler::new(timer, interval),
            config,
            outputs: HashMap::new(),
            next_handle: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Instantiate a virtual output for a new shell or legacy-X surface.
    pub fn create_output(
        &mut self,
        kind: OutputKind,
        override_redirect: bool,
        hooks: &mut dyn CompositorHooks,
    ) -> OutputHandle {
        let handle = OutputHandle(self.next_handle);
        self.next_handle += 1;
        let output = Output::new(
            kind,
            self.link.clone(),
            &self.config.output,
            override_redirect,
            hooks,
        );
        self.outputs.insert(handle, output);
        debug!(?handle, "tracking new output");
        handle
    }

    pub fn output_mut(&mut self, handle: OutputHandle) -> Option<&mut Output> {
        self.outputs.get_mut(&handle)
    }

    /// Access one output together with the shared redraw scheduler, for the
    /// frame-completion path.
    pub fn output_and_scheduler(
        &mut self,
        handle: OutputHandle,
    ) -> Option<(&mut Output, &mut FrameScheduler)> {
        self.outputs
            .get_mut(&handle)
            .map(|output| (output, &mut self.scheduler))
    }

    /// Stop tracking the output and tear its window down. Safe to call once
    /// per handle; an unknown handle is a no-op.
    pub fn destroy_output(&mut self, handle: OutputHandle) {
        if let Some(mut output) = self.outputs.remove(&handle) {
            debug!(?handle, "destroying output");
            output.destroy();
        }
    }

    pub fn scheduler_mut(&mut self) -> &mut FrameScheduler {
        &mut self.scheduler
    }

    /// The deferred redraw timer fired; clears the pending flag. The caller
    /// runs the redraw pass over its scene.
    pub fn on_redraw_timer(&mut self) {
        self.scheduler.on_timer_fired();
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}
