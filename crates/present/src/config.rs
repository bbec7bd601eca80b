use std::env;

pub use common::Environment;

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub environment: Environment,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub ring_path: String,
    pub signal_name: String,
}

impl PreviewConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let width = env::var("PREVIEW_WIDTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1280);

        let height = env::var("PREVIEW_HEIGHT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(720);

        let fps = env::var("PREVIEW_FPS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30.0);

        let ring_path = env::var("PREVIEW_RING_PATH")
            .unwrap_or_else(|_| transport::paths::FRAME_RING_PATH.to_string());

        let signal_name = env::var("PREVIEW_RING_SIGNAL")
            .unwrap_or_else(|_| transport::paths::FRAME_RING_SIGNAL.to_string());

        Ok(Self {
            environment,
            width,
            height,
            fps,
            ring_path,
            signal_name,
        })
    }
}
