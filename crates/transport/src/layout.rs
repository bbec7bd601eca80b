//! Shared-memory layout contract for the frame ring.
//!
//! One contiguous region, logically partitioned into:
//!
//! - a control block of atomic `u32` words (indices, geometry, shutdown,
//!   protocol version),
//! - a metadata table with three `u32` words per slot,
//! - a data table of `slot_count` slots, each exactly `slot_size` bytes.
//!
//! Table offsets are stored in the control block so producer and consumer
//! agree at attach time. All words are little-endian `u32` accessed only
//! through atomic load/store/compare-and-swap; the payload bytes in the
//! data table are ordered by the Acquire/Release pairs on the slot state
//! word (see `region.rs`).

/// Ring protocol ABI version. Attach fails on any mismatch.
pub const PROTOCOL_VERSION: u32 = 1;

/// Data-table slots start on this alignment.
pub const DATA_ALIGN: usize = 64;

/// Control word indices when the region is viewed as a `u32[]`.
pub mod ctrl {
    pub const WRITE_INDEX: usize = 0;
    pub const READ_INDEX: usize = 1;
    pub const SHUTDOWN: usize = 2;
    pub const SLOT_COUNT: usize = 3;
    pub const SLOT_SIZE: usize = 4;
    pub const META_OFFSET: usize = 5;
    pub const DATA_OFFSET: usize = 6;
    pub const VERSION: usize = 7;
    pub const WORDS: usize = 8;
    pub const BYTES: usize = WORDS * 4;
}

/// Word indices within one slot-metadata entry.
pub mod slot_meta {
    pub const LEN: usize = 0;
    pub const FRAME_COUNTER: usize = 1;
    pub const STATE: usize = 2;
    pub const WORDS: usize = 3;
    pub const BYTES: usize = WORDS * 4;
}

/// Slot lifecycle: EMPTY -> WRITING -> READY -> READING -> EMPTY.
///
/// Exactly one thread may hold a slot in WRITING or READING, enforced by
/// compare-and-swap on the state word. A slot never skips READING on its
/// way back to EMPTY, and never becomes READY before its payload and
/// metadata stores are complete.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty = 0,
    Writing = 1,
    Ready = 2,
    Reading = 3,
}

impl SlotState {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(SlotState::Empty),
            1 => Some(SlotState::Writing),
            2 => Some(SlotState::Ready),
            3 => Some(SlotState::Reading),
            _ => None,
        }
    }
}

pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + (align - 1)) & !(align - 1)
}

/// Byte offset of the metadata table (immediately after the control block).
pub fn meta_table_offset() -> usize {
    ctrl::BYTES
}

/// Byte offset of the data table (metadata end, aligned up).
pub fn data_table_offset(slot_count: u32) -> usize {
    align_up(
        meta_table_offset() + slot_count as usize * slot_meta::BYTES,
        DATA_ALIGN,
    )
}

/// Total bytes required for a region with the given geometry.
pub fn region_len(slot_count: u32, slot_size: u32) -> usize {
    data_table_offset(slot_count) + slot_count as usize * slot_size as usize
}
