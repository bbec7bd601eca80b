use anyhow::Context;
use common::setup_logging;
use present::config::PreviewConfig;
use present::renderer::RendererProvider;
use present::service::{self, ViewerConfig};
use present::source::TestPatternSource;
use present::surface::Surface;
use present::ViewerEvent;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use transport::{BASE_RING_CONFIG, RingProducer, compute_ring_config};

fn main() -> anyhow::Result<()> {
    let config = PreviewConfig::from_env()?;
    setup_logging(&config.environment);

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    let frame_bytes =
        config.width as u64 * config.height as u64 * 4 + frame::RGBA_TRAILER_LEN as u64;
    let ring_config = compute_ring_config(frame_bytes, &BASE_RING_CONFIG);

    let mut producer = RingProducer::create(&config.ring_path, &config.signal_name, &ring_config)
        .context("Failed to create frame ring - check /dev/shm availability")?;
    tracing::info!(
        slot_count = ring_config.slot_count,
        slot_size = ring_config.slot_size,
        "Frame ring created"
    );

    let handle = service::spawn(ViewerConfig::default(), RendererProvider::software_only())?;
    handle.init_surface(Surface::new(config.width, config.height))?;
    handle.attach_ring(config.ring_path.clone(), config.signal_name.clone())?;

    let producer_shutdown = Arc::clone(&shutdown);
    let source_config = config.clone();
    let producer_thread = std::thread::spawn(move || {
        let mut source = TestPatternSource::new(
            source_config.width,
            source_config.height,
            source_config.fps,
        );
        let mut buf = Vec::new();

        while !producer_shutdown.load(Ordering::Acquire) {
            source.next_frame(&mut buf);
            if let Err(e) = producer.write(&buf) {
                tracing::error!(error = %e, "Frame write failed");
                break;
            }
            std::thread::sleep(source.frame_interval());
        }

        producer.signal_shutdown();
        source.frames_emitted()
    });

    let mut rendered = 0u64;
    while !shutdown.load(Ordering::Acquire) {
        match handle.events.recv_timeout(Duration::from_millis(100)) {
            Ok(ViewerEvent::FrameRendered { width, height }) => {
                rendered += 1;
                if rendered.is_multiple_of(30) {
                    tracing::info!(rendered, width, height, "Preview status");
                }
            }
            Ok(ViewerEvent::RendererMode(mode)) => {
                tracing::info!(mode = mode.as_str(), "Renderer mode");
            }
            Ok(ViewerEvent::RequestFrame) => {
                tracing::debug!("Viewer asked for a frame resend");
            }
            Ok(ViewerEvent::Error(message)) => {
                tracing::warn!(message = %message, "Viewer reported an error");
            }
            Ok(ViewerEvent::Ready) => {
                tracing::debug!("Viewer ready");
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("Shutting down");
    let produced = producer_thread
        .join()
        .map_err(|_| anyhow::anyhow!("Producer thread panicked"))?;
    handle.join()?;
    tracing::info!(produced, rendered, "Preview stopped");
    Ok(())
}
