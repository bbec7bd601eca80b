pub mod convert;
pub mod errors;
pub mod sequence;
pub mod trailer;

pub use convert::PixelConverter;
pub use errors::CodecError;
pub use sequence::{
    DEFAULT_STALE_WINDOW, OrderDecision, decide_frame_order, forward_delta, is_frame_newer,
    should_drop,
};
pub use trailer::{
    FrameMeta, NV12_MAGIC, NV12_TRAILER_LEN, ParsedFrame, PixelLayout, RGBA_TRAILER_LEN,
    append_nv12_trailer, append_rgba_trailer, parse_frame,
};
