use crate::surface::Surface;
use frame::PixelConverter;

/// Tag mirrored to the controlling side whenever the mode resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererMode {
    Pending,
    Gpu,
    Software,
}

impl RendererMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RendererMode::Pending => "pending",
            RendererMode::Gpu => "gpu",
            RendererMode::Software => "software",
        }
    }
}

/// Drawing capability consumed by the pipeline.
///
/// The GPU implementation is an external collaborator injected through
/// [`RendererProvider`]; the software path lives here and is always
/// available as the fallback.
pub trait Renderer: Send {
    fn init(&mut self, surface: &mut Surface) -> anyhow::Result<()>;

    fn render_rgba(
        &mut self,
        surface: &mut Surface,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: u32,
    ) -> anyhow::Result<()>;

    fn render_nv12(
        &mut self,
        surface: &mut Surface,
        pixels: &[u8],
        width: u32,
        height: u32,
        y_stride: u32,
    ) -> anyhow::Result<()>;

    fn dispose(&mut self);
}

/// Capability probe plus factory for the GPU renderer.
///
/// The probe decides whether the GPU path is attempted at all; a factory
/// or init failure afterwards degrades to software for the lifetime of
/// the surface, never fails the pipeline.
pub struct RendererProvider {
    pub probe: Box<dyn Fn() -> bool + Send>,
    pub create: Box<dyn FnMut() -> anyhow::Result<Box<dyn Renderer>> + Send>,
}

impl RendererProvider {
    /// Provider for hosts without a GPU collaborator: the probe reports
    /// unsupported and the pipeline resolves straight to software.
    pub fn software_only() -> Self {
        Self {
            probe: Box::new(|| false),
            create: Box::new(|| anyhow::bail!("no GPU renderer available")),
        }
    }
}

/// Pixel-buffer renderer: normalizes frames to contiguous RGBA and blits
/// them into the surface backing store.
pub struct SoftwareRenderer {
    converter: PixelConverter,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self {
            converter: PixelConverter::new(),
        }
    }
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for SoftwareRenderer {
    fn init(&mut self, _surface: &mut Surface) -> anyhow::Result<()> {
        Ok(())
    }

    fn render_rgba(
        &mut self,
        surface: &mut Surface,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: u32,
    ) -> anyhow::Result<()> {
        let tight = self.converter.tighten_rgba(pixels, width, height, stride);
        surface.present_rgba(width, height, tight);
        Ok(())
    }

    fn render_nv12(
        &mut self,
        surface: &mut Surface,
        pixels: &[u8],
        width: u32,
        height: u32,
        y_stride: u32,
    ) -> anyhow::Result<()> {
        let rgba = self.converter.nv12_to_rgba(pixels, width, height, y_stride);
        surface.present_rgba(width, height, rgba);
        Ok(())
    }

    fn dispose(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_renderer_blits_tight_rgba() {
        let mut renderer = SoftwareRenderer::new();
        let mut surface = Surface::new(1, 1);

        let rgba = [10, 20, 30, 255, 40, 50, 60, 255];
        renderer.render_rgba(&mut surface, &rgba, 2, 1, 8).unwrap();

        assert_eq!(surface.width(), 2);
        assert_eq!(surface.pixels(), &rgba[..]);
    }

    #[test]
    fn software_renderer_unpads_strided_rows() {
        let mut renderer = SoftwareRenderer::new();
        let mut surface = Surface::new(1, 1);

        // 1x2 image at stride 8.
        let padded = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        renderer.render_rgba(&mut surface, &padded, 1, 2, 8).unwrap();

        assert_eq!(surface.pixels(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn software_renderer_converts_nv12() {
        let mut renderer = SoftwareRenderer::new();
        let mut surface = Surface::new(1, 1);

        // 2x2 video-black.
        let nv12 = [16, 16, 16, 16, 128, 128];
        renderer.render_nv12(&mut surface, &nv12, 2, 2, 2).unwrap();

        for px in surface.pixels().chunks_exact(4) {
            assert_eq!(px, &[0, 0, 0, 255]);
        }
    }
}
