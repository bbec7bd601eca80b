use crate::messages::{ViewerCommand, ViewerEvent};
use crate::pipeline::{PipelineConfig, RenderPipeline};
use crate::renderer::RendererProvider;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use transport::RingConsumer;

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub pipeline: PipelineConfig,
    /// How long the worker parks on the command channel while no ring is
    /// attached (also the cadence of attach retries).
    pub idle_park: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            idle_park: Duration::from_millis(100),
        }
    }
}

/// Controlling-side handle: command sender, event receiver, worker join.
pub struct ViewerHandle {
    commands: flume::Sender<ViewerCommand>,
    pub events: flume::Receiver<ViewerEvent>,
    worker: Option<JoinHandle<()>>,
}

impl ViewerHandle {
    pub fn init_surface(&self, surface: crate::surface::Surface) -> anyhow::Result<()> {
        self.send(ViewerCommand::InitSurface(surface))
    }

    pub fn attach_ring(
        &self,
        region_path: impl Into<PathBuf>,
        signal_name: impl Into<String>,
    ) -> anyhow::Result<()> {
        self.send(ViewerCommand::AttachRing {
            region_path: region_path.into(),
            signal_name: signal_name.into(),
        })
    }

    pub fn resize(&self, width: u32, height: u32) -> anyhow::Result<()> {
        self.send(ViewerCommand::Resize { width, height })
    }

    pub fn reset_frame_state(&self) -> anyhow::Result<()> {
        self.send(ViewerCommand::ResetFrameState)
    }

    pub fn cleanup(&self) -> anyhow::Result<()> {
        self.send(ViewerCommand::Cleanup)
    }

    fn send(&self, command: ViewerCommand) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow::anyhow!("presentation worker is gone"))
    }

    /// Tear down and wait for the worker to exit.
    pub fn join(mut self) -> anyhow::Result<()> {
        self.cleanup().ok();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("presentation worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for ViewerHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.commands.send(ViewerCommand::Cleanup).ok();
            worker.join().ok();
        }
    }
}

/// Spawn the presentation worker thread.
pub fn spawn(config: ViewerConfig, provider: RendererProvider) -> anyhow::Result<ViewerHandle> {
    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (evt_tx, evt_rx) = flume::unbounded();

    let worker = thread::Builder::new()
        .name("preview-viewer".into())
        .spawn(move || run(config, provider, cmd_rx, evt_tx))?;

    Ok(ViewerHandle {
        commands: cmd_tx,
        events: evt_rx,
        worker: Some(worker),
    })
}

fn run(
    config: ViewerConfig,
    provider: RendererProvider,
    commands: flume::Receiver<ViewerCommand>,
    events: flume::Sender<ViewerEvent>,
) {
    events.send(ViewerEvent::Ready).ok();

    let mut pipeline = RenderPipeline::new(config.pipeline.clone(), provider, events.clone());
    let mut pending_ring: Option<(PathBuf, String)> = None;

    loop {
        // Park on the command channel: at tick cadence while frames flow,
        // longer while idle. The loop itself never blocks on the ring.
        let park = if pipeline.is_active() {
            config.pipeline.tick_interval
        } else {
            config.idle_park
        };

        match commands.recv_timeout(park) {
            Ok(command) => {
                if !dispatch(&mut pipeline, &mut pending_ring, command) {
                    return;
                }
                // Drain anything else queued before ticking.
                while let Ok(command) = commands.try_recv() {
                    if !dispatch(&mut pipeline, &mut pending_ring, command) {
                        return;
                    }
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => {
                pipeline.cleanup();
                return;
            }
        }

        // The producer may not have created the ring yet; retry at the
        // park cadence without wedging command handling.
        if let Some((path, signal)) = pending_ring.take() {
            match RingConsumer::attach(&path, &signal) {
                Ok(consumer) => pipeline.attach_ring(consumer),
                Err(e) => {
                    tracing::debug!(error = %e, "Waiting for frame ring");
                    pending_ring = Some((path, signal));
                }
            }
        }

        pipeline.tick();
    }
}

fn dispatch(
    pipeline: &mut RenderPipeline,
    pending_ring: &mut Option<(PathBuf, String)>,
    command: ViewerCommand,
) -> bool {
    match command {
        ViewerCommand::InitSurface(surface) => pipeline.init_surface(surface),
        ViewerCommand::AttachRing {
            region_path,
            signal_name,
        } => *pending_ring = Some((region_path, signal_name)),
        ViewerCommand::Resize { width, height } => pipeline.handle_resize(width, height),
        ViewerCommand::ResetFrameState => pipeline.reset_frame_state(),
        ViewerCommand::Cleanup => {
            pipeline.cleanup();
            return false;
        }
    }
    true
}
