use crate::errors::TransportError;
use crate::layout::{SlotState, ctrl, slot_meta};
use crate::notify::ReadySignal;
use crate::region::SharedRegion;
use crate::sizing::RingConfig;
use common::RetryConfig;
use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Default blocking budget for the read-family calls.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Claim attempts per read-family call; each miss waits one slice of the
/// caller timeout on the ready signal before sweeping again.
const CLAIM_ATTEMPTS: u32 = 3;

/// Bound on index-advancement CAS retries. The index is a probe hint, so
/// giving up after losing this many races is harmless.
const INDEX_ADVANCE_RETRIES: u32 = 16;

fn try_claim(region: &SharedRegion, slot: u32, from: SlotState, to: SlotState) -> bool {
    region
        .meta(slot, slot_meta::STATE)
        .compare_exchange(from as u32, to as u32, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Advance a shared index word past `claimed`, tolerating benign races.
///
/// Another party (a prior call, or the peer role draining concurrently)
/// may have moved the cursor already; an observed value at or past the
/// requested position counts as success. The wrap-aware distance check is
/// what keeps this loop from livelocking against an overtaken expectation.
fn advance_index(word: &AtomicU32, claimed: u32, slot_count: u32) {
    let next = (claimed + 1) % slot_count;
    let mut expected = claimed;
    for _ in 0..INDEX_ADVANCE_RETRIES {
        match word.compare_exchange(expected, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(observed) => {
                let lead = (observed + slot_count - next) % slot_count;
                if lead <= slot_count / 2 {
                    // Cursor already at or past `next`.
                    return;
                }
                expected = observed;
            }
        }
    }
}

/// Producer half of the shared frame ring.
///
/// Single-writer by contract: nothing in the protocol polices a second
/// producer, it would corrupt the slot state machine.
pub struct RingProducer {
    region: SharedRegion,
    signal: ReadySignal,
    retry: RetryConfig,
    frame_counter: u32,
}

impl RingProducer {
    /// Create the shared region and its ready signal.
    ///
    /// Fails fast on invalid geometry (`slot_count < 2`, zero slot size).
    pub fn create(
        path: impl AsRef<Path>,
        signal_name: &str,
        config: &RingConfig,
    ) -> Result<Self, TransportError> {
        let region = SharedRegion::create(path, config.slot_count, config.slot_size)?;
        let signal = ReadySignal::ensure(signal_name)
            .map_err(|e| TransportError::Signal(e.to_string()))?;

        Ok(Self {
            region,
            signal,
            retry: RetryConfig::default(),
            frame_counter: 0,
        })
    }

    pub fn slot_size(&self) -> u32 {
        self.region.slot_size()
    }

    pub fn slot_count(&self) -> u32 {
        self.region.slot_count()
    }

    /// Frames written so far (the producer-side counter stamped into slot
    /// metadata, wrapping).
    pub fn frames_written(&self) -> u32 {
        self.frame_counter
    }

    pub fn is_shutdown(&self) -> bool {
        self.region.ctrl(ctrl::SHUTDOWN).load(Ordering::Acquire) != 0
    }

    /// Write one frame into the ring.
    ///
    /// Never blocks on a full ring: when no slot is EMPTY the oldest
    /// unread READY slot is evicted instead (last-writer-wins). Slots the
    /// consumer holds in READING are never touched; if the consumer has
    /// pinned every slot the claim backs off briefly and then reports
    /// [`TransportError::RingBusy`] rather than corrupting an in-flight
    /// read. Oversized payloads fail up front with
    /// [`TransportError::FrameTooLarge`] so the caller can re-run the
    /// sizing policy and migrate to a bigger ring.
    pub fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let slot_size = self.region.slot_size();
        if payload.len() > slot_size as usize {
            return Err(TransportError::FrameTooLarge {
                len: payload.len(),
                slot_size,
            });
        }

        let slot = self.claim_write_slot()?;

        unsafe {
            std::ptr::copy_nonoverlapping(payload.as_ptr(), self.region.slot_ptr(slot), payload.len());
        }

        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.region
            .meta(slot, slot_meta::LEN)
            .store(payload.len() as u32, Ordering::Relaxed);
        self.region
            .meta(slot, slot_meta::FRAME_COUNTER)
            .store(self.frame_counter, Ordering::Relaxed);

        advance_index(
            self.region.ctrl(ctrl::WRITE_INDEX),
            slot,
            self.region.slot_count(),
        );

        // Publish: the Release store is what hands the payload over.
        self.region
            .meta(slot, slot_meta::STATE)
            .store(SlotState::Ready as u32, Ordering::Release);

        self.signal.post().ok();
        Ok(())
    }

    fn claim_write_slot(&self) -> Result<u32, TransportError> {
        let count = self.region.slot_count();

        for attempt in 0..self.retry.max_attempts {
            let start = self.region.ctrl(ctrl::WRITE_INDEX).load(Ordering::Acquire);

            for i in 0..count {
                let slot = (start + i) % count;
                if try_claim(&self.region, slot, SlotState::Empty, SlotState::Writing) {
                    return Ok(slot);
                }
            }

            // No free slot: evict the oldest unread frame.
            for i in 0..count {
                let slot = (start + i) % count;
                if try_claim(&self.region, slot, SlotState::Ready, SlotState::Writing) {
                    tracing::trace!(slot, "Overwriting unread frame on full ring");
                    return Ok(slot);
                }
            }

            std::thread::sleep(self.retry.delay_for_attempt(attempt));
        }

        Err(TransportError::RingBusy)
    }

    /// Idempotent shutdown: raises the flag and wakes every parked waiter
    /// so blocked consumers exit instead of hanging on their timeout.
    pub fn signal_shutdown(&self) {
        self.region.ctrl(ctrl::SHUTDOWN).store(1, Ordering::Release);
        for _ in 0..self.region.slot_count() {
            self.signal.post().ok();
        }
    }
}

/// Consumer half of the shared frame ring. Single-reader by contract.
pub struct RingConsumer {
    region: Arc<SharedRegion>,
    signal: ReadySignal,
}

impl RingConsumer {
    /// Attach to a region the producer already created. Version or
    /// geometry mismatch is fatal here, before any slot is touched.
    pub fn attach(path: impl AsRef<Path>, signal_name: &str) -> Result<Self, TransportError> {
        let region = Arc::new(SharedRegion::attach(path)?);
        let signal =
            ReadySignal::open(signal_name).map_err(|e| TransportError::Signal(e.to_string()))?;

        Ok(Self { region, signal })
    }

    pub fn slot_size(&self) -> u32 {
        self.region.slot_size()
    }

    pub fn slot_count(&self) -> u32 {
        self.region.slot_count()
    }

    pub fn is_shutdown(&self) -> bool {
        self.region.ctrl(ctrl::SHUTDOWN).load(Ordering::Acquire) != 0
    }

    /// Claim one READY slot, waiting up to `timeout`.
    ///
    /// Sweeps every slot starting at the read-index hint; on a miss it
    /// parks on the ready signal for a slice of the timeout, re-checks
    /// shutdown and sweeps again, up to [`CLAIM_ATTEMPTS`] times. After
    /// shutdown is observed this returns `None` without claiming.
    fn claim_ready(&self, timeout: Duration) -> Option<u32> {
        let wait_slice = timeout / CLAIM_ATTEMPTS;

        for _ in 0..CLAIM_ATTEMPTS {
            if self.is_shutdown() {
                return None;
            }

            if let Some(slot) = self.sweep_ready() {
                // Balance the producer's post for this frame; stale posts
                // would turn later empty-ring waits into busy spins.
                self.signal.try_wait().ok();
                return Some(slot);
            }

            // Nothing ready; park until the producer posts or the slice
            // elapses.
            if let Err(e) = self.signal.timed_wait(wait_slice) {
                tracing::warn!(error = %e, "Ready-signal wait failed");
                return None;
            }
        }

        if self.is_shutdown() {
            return None;
        }
        self.sweep_ready()
    }

    fn sweep_ready(&self) -> Option<u32> {
        let count = self.region.slot_count();
        let start = self.region.ctrl(ctrl::READ_INDEX).load(Ordering::Acquire);
        for i in 0..count {
            let slot = (start + i) % count;
            if try_claim(&self.region, slot, SlotState::Ready, SlotState::Reading) {
                return Some(slot);
            }
        }
        None
    }

    /// Validate a claimed slot's stored length against `cap`.
    ///
    /// A length that cannot fit the slot (or the caller's buffer) means
    /// corrupted metadata: the slot is released, the read index advanced
    /// past it, and the frame dropped rather than read out of bounds.
    fn checked_len(&self, slot: u32, cap: usize) -> Option<usize> {
        let len = self.region.meta(slot, slot_meta::LEN).load(Ordering::Acquire) as usize;
        if len > self.region.slot_size() as usize || len > cap {
            tracing::warn!(slot, len, cap, "Dropping frame with invalid stored length");
            release_slot(&self.region, slot);
            return None;
        }
        Some(len)
    }

    /// Copy the next ready frame into a fresh buffer.
    ///
    /// Returns `None` on timeout, shutdown, or a corrupt slot (which is
    /// skipped, not fatal).
    pub fn read(&self, timeout: Duration) -> Option<Vec<u8>> {
        let slot = self.claim_ready(timeout)?;
        let len = self.checked_len(slot, self.region.slot_size() as usize)?;

        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(self.region.slot_ptr(slot), out.as_mut_ptr(), len);
        }

        release_slot(&self.region, slot);
        Some(out)
    }

    /// Copy the next ready frame into `target`, avoiding allocation.
    ///
    /// Additionally treats a frame larger than `target` as failed
    /// validation: the slot is skipped and `None` returned, so one
    /// poisoned slot cannot wedge the ring.
    pub fn read_into(&self, target: &mut [u8], timeout: Duration) -> Option<usize> {
        let slot = self.claim_ready(timeout)?;
        let cap = target.len().min(self.region.slot_size() as usize);
        let len = self.checked_len(slot, cap)?;

        unsafe {
            std::ptr::copy_nonoverlapping(self.region.slot_ptr(slot), target.as_mut_ptr(), len);
        }

        release_slot(&self.region, slot);
        Some(len)
    }

    /// Zero-copy variant: a live view into shared memory.
    ///
    /// The slot stays pinned in READING until the returned frame is
    /// released (explicitly or on drop); concurrent writes claim other
    /// slots and can never touch the viewed bytes.
    pub fn borrow(&self, timeout: Duration) -> Option<BorrowedFrame> {
        let slot = self.claim_ready(timeout)?;
        let len = self.checked_len(slot, self.region.slot_size() as usize)?;
        let frame_counter = self
            .region
            .meta(slot, slot_meta::FRAME_COUNTER)
            .load(Ordering::Acquire);

        Some(BorrowedFrame {
            region: Arc::clone(&self.region),
            slot,
            len,
            frame_counter,
            released: Cell::new(false),
        })
    }
}

fn release_slot(region: &SharedRegion, slot: u32) {
    region
        .meta(slot, slot_meta::STATE)
        .store(SlotState::Empty as u32, Ordering::Release);
    advance_index(region.ctrl(ctrl::READ_INDEX), slot, region.slot_count());
}

/// A frame viewed directly in shared memory.
///
/// Holding one pins its slot; release returns the slot to the ring and is
/// idempotent (a second call, or the drop after an explicit release, is a
/// no-op).
pub struct BorrowedFrame {
    region: Arc<SharedRegion>,
    slot: u32,
    len: usize,
    frame_counter: u32,
    released: Cell<bool>,
}

impl BorrowedFrame {
    pub fn bytes(&self) -> &[u8] {
        debug_assert!(!self.released.get());
        unsafe { std::slice::from_raw_parts(self.region.slot_ptr(self.slot), self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Producer-side counter stamped when the frame was written; used to
    /// pick the newest of several ready slots without parsing payloads.
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Return the slot to the ring. Safe to call more than once.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        release_slot(&self.region, self.slot);
    }
}

impl Drop for BorrowedFrame {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::RingConfig;
    use tempfile::tempdir;

    fn test_signal(tag: &str) -> String {
        format!("/transport_ring_test_{}_{}", std::process::id(), tag)
    }

    fn ring(
        dir: &tempfile::TempDir,
        tag: &str,
        slot_count: u32,
        slot_size: u32,
    ) -> (RingProducer, RingConsumer, String) {
        let path = dir.path().join(tag);
        let signal = test_signal(tag);
        let _ = ReadySignal::unlink(&signal);

        let producer = RingProducer::create(
            &path,
            &signal,
            &RingConfig {
                slot_count,
                slot_size,
            },
        )
        .unwrap();
        let consumer = RingConsumer::attach(&path, &signal).unwrap();
        (producer, consumer, signal)
    }

    #[test]
    fn write_then_read_returns_exact_bytes() {
        let dir = tempdir().unwrap();
        let (mut producer, consumer, signal) = ring(&dir, "roundtrip", 2, 1024);

        let payload: Vec<u8> = (0..=255u8).cycle().take(777).collect();
        producer.write(&payload).unwrap();

        let read = consumer.read(Duration::from_millis(100)).unwrap();
        assert_eq!(read, payload, "bytes must come back unmodified");

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn oversized_write_is_rejected() {
        let dir = tempdir().unwrap();
        let (mut producer, _consumer, signal) = ring(&dir, "oversized", 2, 64);

        let result = producer.write(&[0u8; 65]);
        assert!(matches!(
            result,
            Err(TransportError::FrameTooLarge { len: 65, slot_size: 64 })
        ));

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn full_ring_evicts_oldest_unread_frame() {
        let dir = tempdir().unwrap();
        let (mut producer, consumer, signal) = ring(&dir, "evict", 2, 64);

        producer.write(&[1u8; 16]).unwrap();
        producer.write(&[2u8; 16]).unwrap();
        producer.write(&[3u8; 16]).unwrap();

        let mut seen: Vec<u8> = Vec::new();
        while let Some(frame) = consumer.read(Duration::ZERO) {
            seen.push(frame[0]);
        }
        seen.sort_unstable();

        assert_eq!(
            seen,
            vec![2, 3],
            "the oldest payload must be silently evicted"
        );

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn borrowed_slot_is_never_overwritten() {
        let dir = tempdir().unwrap();
        let (mut producer, consumer, signal) = ring(&dir, "pinned", 3, 64);

        producer.write(&[b'A'; 8]).unwrap();
        producer.write(&[b'B'; 8]).unwrap();

        let held = consumer.borrow(Duration::from_millis(50)).unwrap();
        assert_eq!(held.bytes()[0], b'A');

        let next = consumer.read(Duration::from_millis(50)).unwrap();
        assert_eq!(next[0], b'B');

        producer.write(&[b'C'; 8]).unwrap();
        producer.write(&[b'D'; 8]).unwrap();

        // The pinned view must still be A, untouched by the writes.
        assert_eq!(held.bytes(), &[b'A'; 8]);
        held.release();

        let mut remaining: Vec<u8> = Vec::new();
        while let Some(frame) = consumer.read(Duration::ZERO) {
            remaining.push(frame[0]);
        }
        remaining.sort_unstable();
        assert_eq!(remaining, vec![b'C', b'D'], "A must never reappear");

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempdir().unwrap();
        let (mut producer, consumer, signal) = ring(&dir, "idempotent", 2, 64);

        producer.write(&[9u8; 8]).unwrap();
        let frame = consumer.borrow(Duration::from_millis(50)).unwrap();

        frame.release();
        frame.release();
        drop(frame);

        // The slot is usable again and only once.
        producer.write(&[10u8; 8]).unwrap();
        assert_eq!(consumer.read(Duration::from_millis(50)).unwrap()[0], 10);
        assert!(consumer.read(Duration::ZERO).is_none());

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn read_into_skips_frames_larger_than_target() {
        let dir = tempdir().unwrap();
        let (mut producer, consumer, signal) = ring(&dir, "poisoned", 2, 256);

        producer.write(&[7u8; 200]).unwrap();
        producer.write(&[8u8; 16]).unwrap();

        let mut small = [0u8; 32];
        assert!(
            consumer.read_into(&mut small, Duration::ZERO).is_none(),
            "frame larger than the target must fail validation"
        );

        // The poisoned slot was skipped, not left wedged.
        let len = consumer.read_into(&mut small, Duration::from_millis(50)).unwrap();
        assert_eq!(len, 16);
        assert_eq!(&small[..16], &[8u8; 16]);

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn read_times_out_on_empty_ring() {
        let dir = tempdir().unwrap();
        let (_producer, consumer, signal) = ring(&dir, "empty", 2, 64);

        let start = std::time::Instant::now();
        assert!(consumer.read(Duration::from_millis(60)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn shutdown_wakes_blocked_reader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shutdown");
        let signal = test_signal("shutdown");
        let _ = ReadySignal::unlink(&signal);

        let producer = RingProducer::create(
            &path,
            &signal,
            &RingConfig {
                slot_count: 2,
                slot_size: 64,
            },
        )
        .unwrap();

        let path_clone = path.clone();
        let signal_clone = signal.clone();
        let reader = std::thread::spawn(move || {
            let consumer = RingConsumer::attach(&path_clone, &signal_clone).unwrap();
            let start = std::time::Instant::now();
            let result = consumer.read(Duration::from_secs(5));
            (result, start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(50));
        producer.signal_shutdown();
        producer.signal_shutdown(); // idempotent

        let (result, waited) = reader.join().unwrap();
        assert!(result.is_none());
        assert!(
            waited < Duration::from_secs(5),
            "shutdown must wake the reader before its timeout"
        );

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn reads_return_none_immediately_after_shutdown() {
        let dir = tempdir().unwrap();
        let (mut producer, consumer, signal) = ring(&dir, "post_shutdown", 2, 64);

        producer.write(&[1u8; 8]).unwrap();
        producer.signal_shutdown();

        assert!(consumer.is_shutdown());
        assert!(consumer.read(Duration::from_millis(100)).is_none());
        assert!(consumer.borrow(Duration::from_millis(100)).is_none());

        let _ = ReadySignal::unlink(&signal);
    }

    #[test]
    fn frame_counter_increments_per_write() {
        let dir = tempdir().unwrap();
        let (mut producer, consumer, signal) = ring(&dir, "counter", 3, 64);

        producer.write(&[0u8; 4]).unwrap();
        producer.write(&[0u8; 4]).unwrap();
        assert_eq!(producer.frames_written(), 2);

        let first = consumer.borrow(Duration::from_millis(50)).unwrap();
        let second = consumer.borrow(Duration::from_millis(50)).unwrap();
        assert_eq!(first.frame_counter(), 1);
        assert_eq!(second.frame_counter(), 2);

        let _ = ReadySignal::unlink(&signal);
    }
}
