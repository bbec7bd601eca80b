//! Pixel normalization for the software render path.
//!
//! The converter owns one scratch buffer, grown to the largest frame seen
//! and reused across calls so steady-state playback allocates nothing.

use crate::trailer::{FrameMeta, PixelLayout};

pub struct PixelConverter {
    scratch: Vec<u8>,
}

impl PixelConverter {
    pub fn new() -> Self {
        Self {
            scratch: Vec::new(),
        }
    }

    fn scratch_mut(&mut self, len: usize) -> &mut [u8] {
        if self.scratch.len() < len {
            tracing::trace!(bytes = len, "Growing conversion scratch buffer");
            self.scratch.resize(len, 0);
        }
        &mut self.scratch[..len]
    }

    /// Repack stride-padded RGBA rows into a contiguous `width*4` image.
    ///
    /// Returns the input untouched when the rows are already tight.
    /// Caller guarantees `pixels` spans `stride * height` bytes (enforced
    /// by trailer validation upstream).
    pub fn tighten_rgba<'a>(
        &'a mut self,
        pixels: &'a [u8],
        width: u32,
        height: u32,
        stride: u32,
    ) -> &'a [u8] {
        let row = width as usize * 4;
        let stride = stride as usize;
        if stride == row {
            return &pixels[..row * height as usize];
        }

        let out_len = row * height as usize;
        let scratch = self.scratch_mut(out_len);
        for y in 0..height as usize {
            let src = &pixels[y * stride..y * stride + row];
            scratch[y * row..(y + 1) * row].copy_from_slice(src);
        }
        &self.scratch[..out_len]
    }

    /// Convert NV12 planes to contiguous RGBA.
    ///
    /// Fixed-point BT.601 (video swing in, full swing out); both planes
    /// honor `y_stride`, chroma at half vertical resolution. Caller
    /// guarantees the plane sizes (trailer validation upstream).
    pub fn nv12_to_rgba(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        y_stride: u32,
    ) -> &[u8] {
        let width = width as usize;
        let height = height as usize;
        let y_stride = y_stride as usize;
        let uv_offset = y_stride * height;
        debug_assert!(pixels.len() >= uv_offset + y_stride * height.div_ceil(2));

        let out_len = width * height * 4;
        let scratch = self.scratch_mut(out_len);

        for y in 0..height {
            let luma_row = &pixels[y * y_stride..];
            let chroma_row = &pixels[uv_offset + (y / 2) * y_stride..];
            let out_row = &mut scratch[y * width * 4..(y + 1) * width * 4];

            for x in 0..width {
                let c = luma_row[x] as i32 - 16;
                let d = chroma_row[(x / 2) * 2] as i32 - 128;
                let e = chroma_row[(x / 2) * 2 + 1] as i32 - 128;

                let r = (298 * c + 409 * e + 128) >> 8;
                let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
                let b = (298 * c + 516 * d + 128) >> 8;

                let out = &mut out_row[x * 4..x * 4 + 4];
                out[0] = r.clamp(0, 255) as u8;
                out[1] = g.clamp(0, 255) as u8;
                out[2] = b.clamp(0, 255) as u8;
                out[3] = 255;
            }
        }

        &self.scratch[..out_len]
    }

    /// Normalize a parsed frame to contiguous RGBA for drawing.
    pub fn to_rgba<'a>(&'a mut self, meta: &FrameMeta, pixels: &'a [u8]) -> &'a [u8] {
        match meta.layout {
            PixelLayout::Rgba { stride } => {
                self.tighten_rgba(pixels, meta.width, meta.height, stride)
            }
            PixelLayout::Nv12 { y_stride } => {
                self.nv12_to_rgba(pixels, meta.width, meta.height, y_stride)
            }
        }
    }
}

impl Default for PixelConverter {
    fn default() -> Self {
        Self::new()
    }
}
