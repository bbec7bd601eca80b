//! Synthetic test-pattern source for the preview binary and the
//! end-to-end tests: a moving gradient with the frame number and a
//! monotonic target presentation time stamped into every trailer.

use frame::append_rgba_trailer;
use std::time::Duration;

pub struct TestPatternSource {
    width: u32,
    height: u32,
    fps: f64,
    frame_number: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            frame_number: 0,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    pub fn frames_emitted(&self) -> u32 {
        self.frame_number
    }

    /// Render the next frame (pixels plus trailer) into `buf`.
    pub fn next_frame(&mut self, buf: &mut Vec<u8>) {
        let phase = self.frame_number;

        buf.clear();
        buf.reserve(self.width as usize * self.height as usize * 4 + frame::RGBA_TRAILER_LEN);
        for y in 0..self.height {
            for x in 0..self.width {
                buf.push(((x + phase) & 0xff) as u8);
                buf.push((y & 0xff) as u8);
                buf.push(((x ^ y) & 0xff) as u8);
                buf.push(255);
            }
        }

        let target_time_ns = (self.frame_number as f64 * 1_000_000_000.0 / self.fps) as u64;
        append_rgba_trailer(
            buf,
            self.width * 4,
            self.height,
            self.width,
            self.frame_number,
            target_time_ns,
        );

        self.frame_number = self.frame_number.wrapping_add(1);
    }
}
