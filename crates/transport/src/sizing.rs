//! Slot geometry policy for the shared frame ring.
//!
//! The ring is sized once per stream from the first observed frame size.
//! Higher resolutions and bit depths grow the slot size; the total
//! footprint is traded off against slot count so the region never exceeds
//! a fixed budget, and at least two slots are always kept so producer and
//! consumer never contend for the same slot under normal operation.

/// Ring geometry: slot count and per-slot byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    pub slot_count: u32,
    pub slot_size: u32,
}

/// Geometry used when no frame has been observed yet (8 slots of 8 MiB,
/// comfortably holding 1080p RGBA frames).
pub const BASE_RING_CONFIG: RingConfig = RingConfig {
    slot_count: 8,
    slot_size: 8 * 1024 * 1024,
};

/// Hard cap on a single slot.
pub const MAX_SLOT_SIZE: u32 = 64 * 1024 * 1024;

/// Hard cap on the whole data table, regardless of requested frame size.
pub const MAX_TOTAL_BYTES: u64 = 128 * 1024 * 1024;

/// Slot sizes round up to this.
const SLOT_ALIGN: u64 = 2 * 1024 * 1024;

/// Double-buffering floor.
const MIN_SLOT_COUNT: u32 = 2;

/// Compute ring geometry for an observed required frame size.
///
/// Adds 25% headroom, rounds up to the 2 MiB alignment, and never shrinks
/// the slot size below `base` nor grows it past [`MAX_SLOT_SIZE`]. The
/// slot count then shrinks as needed to keep
/// `slot_count * slot_size <= MAX_TOTAL_BYTES`, floored at two slots.
pub fn compute_ring_config(required_bytes: u64, base: &RingConfig) -> RingConfig {
    let padded = required_bytes + required_bytes / 4;
    let aligned = padded.div_ceil(SLOT_ALIGN) * SLOT_ALIGN;

    let slot_size = (base.slot_size as u64).max(aligned.min(MAX_SLOT_SIZE as u64)) as u32;

    let fitting = (MAX_TOTAL_BYTES / slot_size as u64) as u32;
    let slot_count = base.slot_count.min(fitting).max(MIN_SLOT_COUNT);

    RingConfig {
        slot_count,
        slot_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn small_frames_keep_the_base_config() {
        let config = compute_ring_config(4 * MIB, &BASE_RING_CONFIG);
        assert_eq!(config, BASE_RING_CONFIG);
    }

    #[test]
    fn large_frames_grow_slots_and_shed_count() {
        // 22 MiB + 25% = 27.5 MiB, aligned up to 28 MiB; only four such
        // slots fit the 128 MiB budget.
        let config = compute_ring_config(22 * MIB, &BASE_RING_CONFIG);
        assert_eq!(config.slot_size as u64, 28 * MIB);
        assert_eq!(config.slot_count, 4);
    }

    #[test]
    fn slot_size_caps_at_the_hard_limit() {
        let config = compute_ring_config(80 * MIB, &BASE_RING_CONFIG);
        assert_eq!(config.slot_size, MAX_SLOT_SIZE);
        assert_eq!(config.slot_count, 2);
    }

    #[test]
    fn total_footprint_never_exceeds_budget() {
        for required in (0..200).map(|i| i * MIB) {
            let config = compute_ring_config(required, &BASE_RING_CONFIG);
            assert!(
                config.slot_count as u64 * config.slot_size as u64 <= MAX_TOTAL_BYTES,
                "budget exceeded for required_bytes={required}"
            );
            assert!(config.slot_count >= 2, "lost double-buffering at {required}");
            assert!(config.slot_size >= BASE_RING_CONFIG.slot_size);
        }
    }
}
