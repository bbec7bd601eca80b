use crate::messages::ViewerEvent;
use crate::queue::{DEFAULT_QUEUE_CAPACITY, FrameQueue, QueuedFrame};
use crate::renderer::{Renderer, RendererMode, RendererProvider, SoftwareRenderer};
use crate::surface::Surface;
use frame::{FrameMeta, PixelLayout, decide_frame_order, is_frame_newer};
use std::time::{Duration, Instant};
use transport::{BorrowedFrame, RingConsumer};

/// Ready slots drained per tick. Bounds per-tick work while still
/// guaranteeing the freshest frame wins when production is bursty.
pub const MAX_DRAIN_PER_TICK: usize = 8;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Backward distance treated as out-of-order noise rather than a seek.
    pub stale_window: u32,
    /// Copy-path queue bound while the renderer mode is unresolved.
    pub queue_capacity: usize,
    /// Scheduling cadence; roughly one display refresh.
    pub tick_interval: Duration,
    /// Frameless ticks after init/reset before asking the producer to
    /// resend the current frame.
    pub quiet_ticks_before_request: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stale_window: frame::DEFAULT_STALE_WINDOW,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tick_interval: Duration::from_millis(16),
            quiet_ticks_before_request: 30,
        }
    }
}

/// Renderer selection state. Resolved exactly once per surface handoff:
/// `Pending` until the capability probe runs, then one-way into `Gpu` or
/// `Software` (a GPU init failure degrades to software permanently).
enum ActiveRenderer {
    Pending { queued: FrameQueue },
    Gpu(Box<dyn Renderer>),
    Software(SoftwareRenderer),
}

impl ActiveRenderer {
    fn mode(&self) -> RendererMode {
        match self {
            ActiveRenderer::Pending { .. } => RendererMode::Pending,
            ActiveRenderer::Gpu(_) => RendererMode::Gpu,
            ActiveRenderer::Software(_) => RendererMode::Software,
        }
    }
}

/// Consumer-side orchestrator: drains the ring, restores frame ordering,
/// normalizes pixels and drives the active renderer once per tick.
pub struct RenderPipeline {
    config: PipelineConfig,
    provider: RendererProvider,
    renderer: ActiveRenderer,
    surface: Option<Surface>,
    consumer: Option<RingConsumer>,
    /// Zero-copy "latest borrowed" slot: the newest drained frame, kept
    /// pinned until it is drawn or superseded.
    held: Option<BorrowedFrame>,
    /// Last frame number accepted for rendering; unset until the first
    /// frame and after a reset.
    latest_frame: Option<u32>,
    drops: u64,
    playback_start: Option<Instant>,
    playback_start_target_ns: Option<u64>,
    quiet_ticks: u32,
    frame_requested: bool,
    events: flume::Sender<ViewerEvent>,
}

impl RenderPipeline {
    pub fn new(
        config: PipelineConfig,
        provider: RendererProvider,
        events: flume::Sender<ViewerEvent>,
    ) -> Self {
        let queue_capacity = config.queue_capacity;
        Self {
            config,
            provider,
            renderer: ActiveRenderer::Pending {
                queued: FrameQueue::new(queue_capacity),
            },
            surface: None,
            consumer: None,
            held: None,
            latest_frame: None,
            drops: 0,
            playback_start: None,
            playback_start_target_ns: None,
            quiet_ticks: 0,
            frame_requested: false,
            events,
        }
    }

    pub fn attach_ring(&mut self, consumer: RingConsumer) {
        tracing::info!(
            slot_count = consumer.slot_count(),
            slot_size = consumer.slot_size(),
            "Frame ring attached"
        );
        self.consumer = Some(consumer);
        self.quiet_ticks = 0;
        self.frame_requested = false;
    }

    pub fn is_active(&self) -> bool {
        self.consumer.is_some()
    }

    pub fn renderer_mode(&self) -> RendererMode {
        self.renderer.mode()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.drops
    }

    pub fn reference_frame(&self) -> Option<u32> {
        self.latest_frame
    }

    /// Take ownership of the drawing surface and resolve the renderer
    /// mode. Frames buffered while pending are flushed through the normal
    /// ordering path, newest first.
    pub fn init_surface(&mut self, mut surface: Surface) {
        if !matches!(self.renderer, ActiveRenderer::Pending { .. }) {
            self.surface = Some(surface);
            return;
        }

        let next = if (self.provider.probe)() {
            match (self.provider.create)() {
                Ok(mut gpu) => match gpu.init(&mut surface) {
                    Ok(()) => ActiveRenderer::Gpu(gpu),
                    Err(e) => {
                        tracing::warn!(error = %e, "GPU renderer init failed; using software path");
                        ActiveRenderer::Software(SoftwareRenderer::new())
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "GPU renderer unavailable; using software path");
                    ActiveRenderer::Software(SoftwareRenderer::new())
                }
            }
        } else {
            ActiveRenderer::Software(SoftwareRenderer::new())
        };

        let previous = std::mem::replace(&mut self.renderer, next);
        self.surface = Some(surface);

        let mode = self.renderer.mode();
        tracing::info!(mode = mode.as_str(), "Renderer mode resolved");
        self.events.send(ViewerEvent::RendererMode(mode)).ok();

        if let ActiveRenderer::Pending { mut queued } = previous
            && let Some(buffered) = queued.take_newest()
        {
            self.present_queued(buffered);
        }
    }

    /// One scheduling iteration. Returns true when a frame was drawn.
    pub fn tick(&mut self) -> bool {
        let Some(consumer) = &self.consumer else {
            return false;
        };

        // Drain ready slots, newest wins; stale borrows are released
        // immediately so the producer gets its slots back.
        let mut newest = self.held.take();
        for _ in 0..MAX_DRAIN_PER_TICK {
            let Some(candidate) = consumer.borrow(Duration::ZERO) else {
                break;
            };
            newest = match newest {
                Some(current)
                    if !is_frame_newer(candidate.frame_counter(), current.frame_counter()) =>
                {
                    candidate.release();
                    Some(current)
                }
                Some(current) => {
                    current.release();
                    Some(candidate)
                }
                None => Some(candidate),
            };
        }

        let Some(borrowed) = newest else {
            self.note_quiet_tick();
            return false;
        };
        self.quiet_ticks = 0;
        self.frame_requested = false;

        // Trailer validation before any pixel access; malformed frames
        // are dropped and reported, never fatal.
        let meta = match frame::parse_frame(borrowed.bytes()) {
            Ok(parsed) => parsed.meta,
            Err(e) => {
                tracing::warn!(error = %e, len = borrowed.len(), "Dropping malformed frame");
                self.events.send(ViewerEvent::Error(e.to_string())).ok();
                borrowed.release();
                return false;
            }
        };

        // Unresolved renderer: buffer a copy instead of dropping, the
        // surface handoff will flush it.
        if let ActiveRenderer::Pending { queued } = &mut self.renderer {
            let pixel_end = borrowed.len() - meta.layout.trailer_len();
            queued.push(QueuedFrame {
                meta,
                pixels: borrowed.bytes()[..pixel_end].to_vec(),
            });
            borrowed.release();
            return false;
        }

        let decision =
            decide_frame_order(Some(meta.frame_number), self.latest_frame, self.config.stale_window);
        if !decision.accept {
            self.drops += decision.drops as u64;
            tracing::debug!(
                frame = meta.frame_number,
                reference = ?self.latest_frame,
                total_drops = self.drops,
                "Dropping stale frame"
            );
            borrowed.release();
            return false;
        }

        // A frame that is not the immediate successor is a seek or stream
        // restart: re-anchor pacing so the jump does not stall playback.
        let is_jump = match self.latest_frame {
            Some(latest) => meta.frame_number != latest.wrapping_add(1),
            None => true,
        };
        if is_jump {
            self.playback_start = Some(Instant::now());
            self.playback_start_target_ns = Some(meta.target_time_ns);
        }

        // Hold a frame that is more than one tick early; it stays pinned
        // and re-enters the drain next tick.
        if !self.frame_is_due(meta.target_time_ns) {
            self.held = Some(borrowed);
            return false;
        }

        self.latest_frame = decision.next_latest;

        let pixel_end = borrowed.len() - meta.layout.trailer_len();
        let drawn = self.draw(&meta, &borrowed.bytes()[..pixel_end]);
        borrowed.release();
        drawn
    }

    fn frame_is_due(&self, target_time_ns: u64) -> bool {
        let (Some(start), Some(anchor)) = (self.playback_start, self.playback_start_target_ns)
        else {
            return true;
        };
        let elapsed_ns = start.elapsed().as_nanos() as u64;
        let offset_ns = target_time_ns.saturating_sub(anchor);
        offset_ns <= elapsed_ns + self.config.tick_interval.as_nanos() as u64
    }

    fn note_quiet_tick(&mut self) {
        self.quiet_ticks = self.quiet_ticks.saturating_add(1);
        if !self.frame_requested && self.quiet_ticks >= self.config.quiet_ticks_before_request {
            self.frame_requested = true;
            tracing::debug!("No frames arriving; asking the producer to resend");
            self.events.send(ViewerEvent::RequestFrame).ok();
        }
    }

    /// Run a previously-buffered frame through ordering and draw it.
    fn present_queued(&mut self, buffered: QueuedFrame) -> bool {
        let decision = decide_frame_order(
            Some(buffered.meta.frame_number),
            self.latest_frame,
            self.config.stale_window,
        );
        if !decision.accept {
            self.drops += decision.drops as u64;
            return false;
        }

        self.playback_start = Some(Instant::now());
        self.playback_start_target_ns = Some(buffered.meta.target_time_ns);
        self.latest_frame = decision.next_latest;
        self.draw(&buffered.meta, &buffered.pixels)
    }

    fn draw(&mut self, meta: &FrameMeta, pixels: &[u8]) -> bool {
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };

        let result = match &mut self.renderer {
            ActiveRenderer::Pending { .. } => return false,
            ActiveRenderer::Gpu(renderer) => match meta.layout {
                PixelLayout::Rgba { stride } => {
                    renderer.render_rgba(surface, pixels, meta.width, meta.height, stride)
                }
                PixelLayout::Nv12 { y_stride } => {
                    renderer.render_nv12(surface, pixels, meta.width, meta.height, y_stride)
                }
            },
            ActiveRenderer::Software(renderer) => match meta.layout {
                PixelLayout::Rgba { stride } => {
                    renderer.render_rgba(surface, pixels, meta.width, meta.height, stride)
                }
                PixelLayout::Nv12 { y_stride } => {
                    renderer.render_nv12(surface, pixels, meta.width, meta.height, y_stride)
                }
            },
        };

        match result {
            Ok(()) => {
                self.events
                    .send(ViewerEvent::FrameRendered {
                        width: meta.width,
                        height: meta.height,
                    })
                    .ok();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, frame = meta.frame_number, "Renderer failed on frame");
                self.events.send(ViewerEvent::Error(e.to_string())).ok();
                false
            }
        }
    }

    /// Resize the surface. Matching dimensions keep the drawn content;
    /// anything else clears to black until the next frame lands.
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        if surface.width() == width && surface.height() == height {
            return;
        }
        surface.resize(width, height);
        tracing::debug!(width, height, "Surface resized and cleared");
    }

    /// Clear sequencing and timing state on a seek or stream restart.
    pub fn reset_frame_state(&mut self) {
        self.latest_frame = None;
        self.playback_start = None;
        self.playback_start_target_ns = None;
        self.drops = 0;
        self.quiet_ticks = 0;
        self.frame_requested = false;
        if let Some(held) = self.held.take() {
            held.release();
        }
    }

    /// Full teardown: release pinned frames, dispose the renderer and
    /// drop all cached state. The pipeline returns to its pre-init shape.
    pub fn cleanup(&mut self) {
        if let Some(held) = self.held.take() {
            held.release();
        }

        match &mut self.renderer {
            ActiveRenderer::Pending { queued } => queued.clear(),
            ActiveRenderer::Gpu(renderer) => renderer.dispose(),
            ActiveRenderer::Software(renderer) => renderer.dispose(),
        }
        self.renderer = ActiveRenderer::Pending {
            queued: FrameQueue::new(self.config.queue_capacity),
        };

        self.consumer = None;
        self.surface = None;
        self.reset_frame_state();
        tracing::info!("Render pipeline cleaned up");
    }
}
