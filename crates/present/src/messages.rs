use crate::renderer::RendererMode;
use crate::surface::Surface;
use std::path::PathBuf;

/// Control messages into the presentation worker.
///
/// Cross-thread signaling is plain data end to end: no exception or panic
/// ever crosses this boundary.
#[derive(Debug)]
pub enum ViewerCommand {
    /// Hand over exclusive ownership of the drawing surface.
    InitSurface(Surface),
    /// Attach the shared frame ring by name; the worker retries until the
    /// producer has created it.
    AttachRing {
        region_path: PathBuf,
        signal_name: String,
    },
    Resize { width: u32, height: u32 },
    /// Clear sequencing and timing state (seek / stream restart).
    ResetFrameState,
    /// Full teardown; the worker exits after acknowledging.
    Cleanup,
}

/// Events back to the controlling side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Ready,
    RendererMode(RendererMode),
    FrameRendered { width: u32, height: u32 },
    /// Nothing has arrived since init/reset; ask the producer to resend.
    RequestFrame,
    Error(String),
}
