use crate::errors::TransportError;
use crate::layout::{self, ctrl, slot_meta};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// SAFETY & MEMORY ORDERING:
///
/// A `SharedRegion` maps one `/dev/shm` file shared between the producer
/// and consumer processes.
///
/// Writer protocol per slot:
/// 1. CAS the slot state EMPTY -> WRITING (claims exclusive data access)
/// 2. Copy payload bytes into the slot's data range
/// 3. Store frame length and frame counter (Relaxed)
/// 4. Publish with a `Release` store of READY
///
/// Reader protocol per slot:
/// 1. CAS the slot state READY -> READING with `Acquire` (claims the data)
/// 2. Read length/counter/payload
/// 3. Store EMPTY with `Release`, then advance the shared read index
///
/// The Acquire/Release pair on the state word makes every payload and
/// metadata write happen-before any read on the other side; the data
/// bytes themselves need no atomics because WRITING/READING grant
/// exclusive ownership of the slot's range.
///
/// The control words are initialized before the version word, which is
/// published last with `Release`; `attach` validates it with `Acquire`,
/// so an attacher can never observe a half-initialized control block.
#[derive(Debug)]
pub struct SharedRegion {
    mmap: MmapMut,
    base: *mut u8,
    slot_count: u32,
    slot_size: u32,
    data_offset: usize,
}

unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create (or reset) a region with the given geometry.
    ///
    /// Geometry is validated here and never changes afterwards; resizing
    /// means creating a new region and attaching consumers to it.
    pub fn create(
        path: impl AsRef<Path>,
        slot_count: u32,
        slot_size: u32,
    ) -> Result<Self, TransportError> {
        if slot_count < 2 || slot_size == 0 {
            return Err(TransportError::InvalidConfig {
                slot_count,
                slot_size,
            });
        }

        let len = layout::region_len(slot_count, slot_size);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&path)?;

        if file.metadata()?.len() < len as u64 {
            file.set_len(len as u64)?;
        }

        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        let base = mmap.as_mut_ptr();

        let region = Self {
            mmap,
            base,
            slot_count,
            slot_size,
            data_offset: layout::data_table_offset(slot_count),
        };

        // A reused file may hold stale indices and slot states from a
        // previous run; reset everything before publishing the version.
        region.ctrl(ctrl::WRITE_INDEX).store(0, Ordering::Relaxed);
        region.ctrl(ctrl::READ_INDEX).store(0, Ordering::Relaxed);
        region.ctrl(ctrl::SHUTDOWN).store(0, Ordering::Relaxed);
        region
            .ctrl(ctrl::SLOT_COUNT)
            .store(slot_count, Ordering::Relaxed);
        region
            .ctrl(ctrl::SLOT_SIZE)
            .store(slot_size, Ordering::Relaxed);
        region
            .ctrl(ctrl::META_OFFSET)
            .store(layout::meta_table_offset() as u32, Ordering::Relaxed);
        region
            .ctrl(ctrl::DATA_OFFSET)
            .store(region.data_offset as u32, Ordering::Relaxed);

        for slot in 0..slot_count {
            region.meta(slot, slot_meta::LEN).store(0, Ordering::Relaxed);
            region
                .meta(slot, slot_meta::FRAME_COUNTER)
                .store(0, Ordering::Relaxed);
            region
                .meta(slot, slot_meta::STATE)
                .store(0, Ordering::Relaxed);
        }

        region
            .ctrl(ctrl::VERSION)
            .store(layout::PROTOCOL_VERSION, Ordering::Release);

        tracing::debug!(
            path = %path.as_ref().display(),
            slot_count,
            slot_size,
            region_bytes = len,
            "Shared frame ring created"
        );

        Ok(region)
    }

    /// Map an existing region, validating the protocol version and
    /// geometry. Any mismatch is fatal here, before a single slot is
    /// touched.
    pub fn attach(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        if mmap.len() < ctrl::BYTES {
            return Err(TransportError::InvalidConfig {
                slot_count: 0,
                slot_size: 0,
            });
        }

        let base = mmap.as_mut_ptr();

        let version =
            unsafe { &*(base.add(ctrl::VERSION * 4) as *const AtomicU32) }.load(Ordering::Acquire);
        if version != layout::PROTOCOL_VERSION {
            return Err(TransportError::VersionMismatch {
                expected: layout::PROTOCOL_VERSION,
                found: version,
            });
        }

        let slot_count = unsafe { &*(base.add(ctrl::SLOT_COUNT * 4) as *const AtomicU32) }
            .load(Ordering::Acquire);
        let slot_size = unsafe { &*(base.add(ctrl::SLOT_SIZE * 4) as *const AtomicU32) }
            .load(Ordering::Acquire);

        if slot_count < 2
            || slot_size == 0
            || mmap.len() < layout::region_len(slot_count, slot_size)
        {
            return Err(TransportError::InvalidConfig {
                slot_count,
                slot_size,
            });
        }

        Ok(Self {
            mmap,
            base,
            slot_count,
            slot_size,
            data_offset: layout::data_table_offset(slot_count),
        })
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    /// Atomic view of a control word.
    pub fn ctrl(&self, word: usize) -> &AtomicU32 {
        debug_assert!(word < ctrl::WORDS);
        unsafe { &*(self.base.add(word * 4) as *const AtomicU32) }
    }

    /// Atomic view of one word of a slot's metadata entry.
    pub fn meta(&self, slot: u32, word: usize) -> &AtomicU32 {
        debug_assert!(slot < self.slot_count && word < slot_meta::WORDS);
        let offset = layout::meta_table_offset() + slot as usize * slot_meta::BYTES + word * 4;
        unsafe { &*(self.base.add(offset) as *const AtomicU32) }
    }

    /// Raw pointer to the start of a slot's data range.
    ///
    /// Callers must hold the slot in WRITING (writes) or READING (reads);
    /// the state word CAS is what transfers ownership of these bytes.
    pub fn slot_ptr(&self, slot: u32) -> *mut u8 {
        debug_assert!(slot < self.slot_count);
        let offset = self.data_offset + slot as usize * self.slot_size as usize;
        debug_assert!(offset + self.slot_size as usize <= self.mmap.len());
        unsafe { self.base.add(offset) }
    }
}
