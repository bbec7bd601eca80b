use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ring protocol version mismatch: region has {found}, expected {expected}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("invalid ring geometry: {slot_count} slots of {slot_size} bytes")]
    InvalidConfig { slot_count: u32, slot_size: u32 },

    #[error("frame of {len} bytes exceeds slot size of {slot_size} bytes")]
    FrameTooLarge { len: usize, slot_size: u32 },

    #[error("every slot is held by the consumer")]
    RingBusy,

    #[error("signal error: {0}")]
    Signal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TransportError::VersionMismatch {
            expected: 1,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "ring protocol version mismatch: region has 3, expected 1"
        );

        let err = TransportError::FrameTooLarge {
            len: 4096,
            slot_size: 1024,
        };
        assert_eq!(
            err.to_string(),
            "frame of 4096 bytes exceeds slot size of 1024 bytes"
        );
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> Result<(), TransportError> {
            Err(io::Error::other("mapping failed"))?;
            Ok(())
        }

        match fails().unwrap_err() {
            TransportError::Io(e) => assert_eq!(e.to_string(), "mapping failed"),
            other => panic!("expected Io variant, got {other:?}"),
        }
    }
}
