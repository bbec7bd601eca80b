//! Fixed-layout metadata trailer at the tail of every frame payload.
//!
//! The producer appends the trailer after the pixel bytes, little-endian:
//!
//! RGBA, 24 bytes:
//! `[stride u32][height u32][width u32][frame_number u32][target_time_ns u64]`
//!
//! NV12, 28 bytes:
//! `[y_stride u32][height u32][width u32][frame_number u32][target_time_ns u64][magic u32]`
//!
//! The trailing magic (`b"NV12"`) is what distinguishes the two layouts;
//! a payload without it is RGBA.

use crate::errors::CodecError;

pub const RGBA_TRAILER_LEN: usize = 24;
pub const NV12_TRAILER_LEN: usize = 28;

/// `b"NV12"` read as a little-endian u32.
pub const NV12_MAGIC: u32 = u32::from_le_bytes(*b"NV12");

/// Upper bound on either frame dimension. Anything past this is corrupt
/// metadata, not a real display stream, and keeps the row math far from
/// u32 overflow.
pub const MAX_DIMENSION: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 4 bytes per pixel, rows `stride` bytes apart (stride >= width*4).
    Rgba { stride: u32 },
    /// Planar luma followed by interleaved chroma at half vertical
    /// resolution, both planes `y_stride` bytes per row.
    Nv12 { y_stride: u32 },
}

impl PixelLayout {
    /// Trailer bytes at the payload tail for this layout.
    pub fn trailer_len(&self) -> usize {
        match self {
            PixelLayout::Rgba { .. } => RGBA_TRAILER_LEN,
            PixelLayout::Nv12 { .. } => NV12_TRAILER_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    pub frame_number: u32,
    pub target_time_ns: u64,
    pub layout: PixelLayout,
}

impl FrameMeta {
    /// Bytes the pixel data must span for this layout.
    pub fn pixel_bytes(&self) -> usize {
        match self.layout {
            PixelLayout::Rgba { stride } => stride as usize * self.height as usize,
            PixelLayout::Nv12 { y_stride } => {
                let luma = y_stride as usize * self.height as usize;
                let chroma = y_stride as usize * self.height.div_ceil(2) as usize;
                luma + chroma
            }
        }
    }
}

/// A payload split into its pixel bytes and decoded trailer.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedFrame<'a> {
    pub meta: FrameMeta,
    pub pixels: &'a [u8],
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

/// Parse and validate the trailer at the tail of `payload`.
///
/// Bounds are checked before any pixel access: dimensions must be
/// non-zero, the stride must cover a full row, and the pixel bytes ahead
/// of the trailer must span the whole image. Failures are reported, never
/// panicked on - the payload came over a trust boundary.
pub fn parse_frame(payload: &[u8]) -> Result<ParsedFrame<'_>, CodecError> {
    let is_nv12 = payload.len() >= NV12_TRAILER_LEN
        && read_u32(payload, payload.len() - 4) == NV12_MAGIC;

    let trailer_len = if is_nv12 { NV12_TRAILER_LEN } else { RGBA_TRAILER_LEN };
    if payload.len() < trailer_len {
        return Err(CodecError::TooShort {
            len: payload.len(),
            needed: trailer_len,
        });
    }

    let trailer = &payload[payload.len() - trailer_len..];
    let stride = read_u32(trailer, 0);
    let height = read_u32(trailer, 4);
    let width = read_u32(trailer, 8);
    let frame_number = read_u32(trailer, 12);
    let target_time_ns = read_u64(trailer, 16);

    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CodecError::BadDimensions { width, height });
    }

    let min_row = if is_nv12 { width } else { width * 4 };
    if stride < min_row {
        return Err(CodecError::StrideTooNarrow {
            stride,
            row: min_row,
        });
    }

    let meta = FrameMeta {
        width,
        height,
        frame_number,
        target_time_ns,
        layout: if is_nv12 {
            PixelLayout::Nv12 { y_stride: stride }
        } else {
            PixelLayout::Rgba { stride }
        },
    };

    let pixels = &payload[..payload.len() - trailer_len];
    let need = meta.pixel_bytes();
    if pixels.len() < need {
        return Err(CodecError::Truncated {
            have: pixels.len(),
            need,
        });
    }

    Ok(ParsedFrame { meta, pixels })
}

/// Append an RGBA trailer to a pixel buffer (producer side).
pub fn append_rgba_trailer(
    buf: &mut Vec<u8>,
    stride: u32,
    height: u32,
    width: u32,
    frame_number: u32,
    target_time_ns: u64,
) {
    buf.extend_from_slice(&stride.to_le_bytes());
    buf.extend_from_slice(&height.to_le_bytes());
    buf.extend_from_slice(&width.to_le_bytes());
    buf.extend_from_slice(&frame_number.to_le_bytes());
    buf.extend_from_slice(&target_time_ns.to_le_bytes());
}

/// Append an NV12 trailer, magic last (producer side).
pub fn append_nv12_trailer(
    buf: &mut Vec<u8>,
    y_stride: u32,
    height: u32,
    width: u32,
    frame_number: u32,
    target_time_ns: u64,
) {
    buf.extend_from_slice(&y_stride.to_le_bytes());
    buf.extend_from_slice(&height.to_le_bytes());
    buf.extend_from_slice(&width.to_le_bytes());
    buf.extend_from_slice(&frame_number.to_le_bytes());
    buf.extend_from_slice(&target_time_ns.to_le_bytes());
    buf.extend_from_slice(&NV12_MAGIC.to_le_bytes());
}
