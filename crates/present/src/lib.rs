pub mod config;
pub mod messages;
pub mod pipeline;
pub mod queue;
pub mod renderer;
pub mod service;
pub mod source;
pub mod surface;

pub use messages::{ViewerCommand, ViewerEvent};
pub use pipeline::{PipelineConfig, RenderPipeline};
pub use renderer::{Renderer, RendererMode, RendererProvider, SoftwareRenderer};
pub use service::{ViewerConfig, ViewerHandle, spawn};
pub use surface::Surface;
