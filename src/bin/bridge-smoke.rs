//! Drives the output bridge through a full window lifecycle against an
//! in-process transport that hex-dumps every wire message, so the framing
//! can be eyeballed without a GUI daemon on the other end.

use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use porthole::{
    Bridge, CompositorHooks, Config, CustomMode, DamageBox, Geometry, GrantBuffer, OutputKind,
    PendingBuffer, PendingState, RedrawTimer, SequentialIds, Transport, WindowFlag,
};

struct HexDumpTransport;

impl Transport for HexDumpTransport {
    fn send(&mut self, msg: &[u8]) {
        let hex: String = msg.iter().map(|b| format!("{b:02x}")).collect();
        println!("--> {} bytes: {hex}", msg.len());
    }
}

struct LoggingTimer;

impl RedrawTimer for LoggingTimer {
    fn arm(&mut self, delay: Duration) {
        println!("(redraw timer armed for {delay:?})");
    }
}

#[derive(Default)]
struct PrintingHooks;

impl CompositorHooks for PrintingHooks {
    fn update_custom_mode(&mut self, width: u32, height: u32, refresh_mhz: u32) {
        println!("(custom mode {width}x{height}@{refresh_mhz}mHz)");
    }
    fn update_enabled(&mut self, enabled: bool) {
        println!("(enabled: {enabled})");
    }
    fn send_frame(&mut self) {
        println!("(frame signalled)");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "porthole=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting bridge smoke run");

    let mut bridge = Bridge::new(
        Box::new(HexDumpTransport),
        Box::new(SequentialIds::new()),
        Box::new(LoggingTimer),
        Config::default(),
    );
    let mut hooks = PrintingHooks;

    let handle = bridge.create_output(OutputKind::Shell, false, &mut hooks);
    let output = bridge.output_mut(handle).expect("just created");

    output.configure(Geometry::new(0, 0, 800, 600), &mut hooks)?;
    output.map(Geometry::new(0, 0, 800, 600))?;

    let size = 800 * 600 * 4;
    let buffer = GrantBuffer::new(800, 600, size, (0..porthole::proto::num_pages(size) as u32).collect());
    output.commit(
        &PendingState {
            mode: Some(CustomMode { width: 800, height: 600, refresh_mhz: 60_000 }),
            buffer: Some(PendingBuffer::Grant(buffer)),
            enabled: Some(true),
            damage: vec![DamageBox { x1: 10, y1: 10, x2: 50, y2: 50 }],
        },
        &mut hooks,
    )?;

    output.set_flags(WindowFlag::DEMANDS_ATTENTION, WindowFlag::empty());
    output.configure(Geometry::new(0, 0, 1000, 600), &mut hooks)?;

    let (output, scheduler) = bridge
        .output_and_scheduler(handle)
        .expect("still tracked");
    output.handle_frame(true, &mut hooks, scheduler);
    bridge.on_redraw_timer();

    bridge.destroy_output(handle);
    info!("Smoke run complete");
    Ok(())
}
