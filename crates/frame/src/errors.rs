use thiserror::Error;

/// Frame-level validation failures.
///
/// All of these are non-fatal to the pipeline: the offending frame is
/// dropped and reported, processing continues.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload of {len} bytes is shorter than the {needed}-byte trailer")]
    TooShort { len: usize, needed: usize },

    #[error("frame dimensions out of range: {width}x{height}")]
    BadDimensions { width: u32, height: u32 },

    #[error("stride of {stride} bytes cannot hold a row of {row} bytes")]
    StrideTooNarrow { stride: u32, row: u32 },

    #[error("pixel data truncated: have {have} bytes, layout needs {need}")]
    Truncated { have: usize, need: usize },
}
