//! Porthole
//!
//! Bridge between a compositor's output/surface model and a remote,
//! privilege-separated GUI daemon running in a different isolation domain.
//! Compositor lifecycle events (surface created, mapped, resized, damaged,
//! unmapped, destroyed) are translated into a fixed wire protocol carried
//! over an inter-domain channel; wire-level constraints (maximum window
//! size, grant-based shared memory) flow back into compositor state.
//!
//! The compositor engine itself, the shell protocol server, the legacy-X
//! glue, the renderer and the physical transport are external collaborators
//! reached through the traits in [`link`], [`output`] and [`frame`]; this
//! crate owns the window lifecycle state machine, the message codec, damage
//! extraction, the shared-buffer lifecycle and redraw scheduling.

pub mod bridge;
pub mod buffer;
pub mod config;
pub mod damage;
pub mod formats;
pub mod frame;
pub mod geometry;
pub mod link;
pub mod output;
pub mod proto;
pub mod signal;

pub use bridge::{Bridge, OutputHandle};
pub use buffer::{BufferSlot, GrantBuffer, GrantRef, PendingBuffer};
pub use config::Config;
pub use damage::{DamageBox, DamageError};
pub use frame::{FrameScheduler, RedrawTimer};
pub use geometry::Geometry;
pub use link::{GuiLink, IdExhausted, SequentialIds, Transport, WindowIdAllocator};
pub use output::{
    CommitError, CompositorHooks, CustomMode, Output, OutputFlags, OutputKind, PendingState,
};
pub use proto::WindowFlag;
