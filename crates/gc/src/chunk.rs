//! Fixed-capacity slab storage.
//!
//! A [`ChunkBox`] hands out slots from a growing list of 32-slot chunks. Each
//! chunk tracks which of its slots are occupied and which were reached during
//! the last mark phase in two bitmaps. Chunks with at least one free slot are
//! threaded onto an intrusive free list, so allocation never scans full chunks.

use std::mem::size_of;

use tracing::trace;

/// Number of slots in a single chunk.
pub const CHUNK_SLOTS: usize = 32;

// Occupancy and marks are stored as one bit per slot.
static_assertions::const_assert_eq!(CHUNK_SLOTS, u32::BITS as usize);

const FULL: u32 = u32::MAX;

/// Index of a slot inside a [`ChunkBox`].
///
/// Slot ids stay valid until the slot is freed or swept. They are plain
/// indices, so holding one does not keep anything alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u32);

impl SlotId {
    fn new(chunk: usize, slot: usize) -> Self {
        SlotId((chunk * CHUNK_SLOTS + slot) as u32)
    }

    /// The chunk this slot lives in.
    pub fn chunk(self) -> usize {
        self.0 as usize / CHUNK_SLOTS
    }

    /// Position of this slot inside its chunk.
    pub fn slot(self) -> usize {
        self.0 as usize % CHUNK_SLOTS
    }

    /// Get the raw index of this slot.
    pub fn index(self) -> u32 {
        self.0
    }

    fn bit(self) -> u32 {
        1 << self.slot()
    }
}

struct Chunk<T> {
    slots: [Option<T>; CHUNK_SLOTS],
    /// Occupied slots.
    used: u32,
    /// Slots reached during the current mark phase.
    mark: u32,
    /// The next chunk on the free list. Only meaningful while this chunk is linked.
    next: Option<usize>,
}

impl<T> Chunk<T> {
    fn new() -> Box<Self> {
        Box::new(Chunk {
            slots: std::array::from_fn(|_| None),
            used: 0,
            mark: 0,
            next: None,
        })
    }

    fn is_full(&self) -> bool {
        self.used == FULL
    }

    fn take(&mut self, slot: usize) -> Option<T> {
        let bit = 1 << slot;
        if self.used & bit == 0 {
            return None;
        }
        self.used &= !bit;
        self.slots[slot].take()
    }
}

/// Find `len` consecutive free bits in `used`, returning the first position.
fn find_run(used: u32, len: usize) -> Option<usize> {
    let mask = if len == CHUNK_SLOTS {
        FULL
    } else {
        (1u32 << len) - 1
    };
    (0..=CHUNK_SLOTS - len).find(|&shift| used & (mask << shift) == 0)
}

/// An unbounded collection of chunks.
pub struct ChunkBox<T> {
    chunks: Vec<Box<Chunk<T>>>,
    /// First chunk known to have a free slot. Chunks on this list are never full.
    free_head: Option<usize>,
}

impl<T> Default for ChunkBox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChunkBox<T> {
    pub fn new() -> Self {
        ChunkBox {
            chunks: Vec::new(),
            free_head: None,
        }
    }

    /// Allocate a new empty chunk and push it onto the free list.
    fn grow(&mut self) -> usize {
        let idx = self.chunks.len();
        assert!(
            (idx + 1) * CHUNK_SLOTS <= u32::MAX as usize,
            "Cannot hold more than 2^32 slots in one chunk box"
        );
        self.chunks.push(Chunk::new());
        self.relink(idx);
        trace!(chunk = idx, "allocated chunk");
        idx
    }

    fn relink(&mut self, idx: usize) {
        self.chunks[idx].next = self.free_head;
        self.free_head = Some(idx);
    }

    /// Store `value` in the first free slot and return its id.
    pub fn reserve_element(&mut self, value: T) -> SlotId {
        let idx = match self.free_head {
            Some(idx) => idx,
            None => self.grow(),
        };

        let chunk = &mut self.chunks[idx];
        let slot = (!chunk.used).trailing_zeros() as usize;
        debug_assert!(slot < CHUNK_SLOTS, "full chunk on the free list");

        chunk.slots[slot] = Some(value);
        chunk.used |= 1 << slot;
        if chunk.is_full() {
            self.free_head = chunk.next.take();
        }

        SlotId::new(idx, slot)
    }

    /// Store up to [`CHUNK_SLOTS`] values in consecutive slots of one chunk.
    ///
    /// Returns the id of the first slot, or `None` if `values` is empty or
    /// longer than a chunk.
    pub fn reserve_run(&mut self, values: Vec<T>) -> Option<SlotId> {
        let len = values.len();
        if len == 0 || len > CHUNK_SLOTS {
            return None;
        }

        let mut prev = None;
        let mut cursor = self.free_head;
        let (idx, start) = loop {
            match cursor {
                Some(idx) => {
                    if let Some(start) = find_run(self.chunks[idx].used, len) {
                        break (idx, start);
                    }
                    prev = Some(idx);
                    cursor = self.chunks[idx].next;
                }
                None => {
                    // A fresh chunk goes to the head of the free list.
                    prev = None;
                    break (self.grow(), 0);
                }
            }
        };

        let chunk = &mut self.chunks[idx];
        for (offset, value) in values.into_iter().enumerate() {
            chunk.slots[start + offset] = Some(value);
            chunk.used |= 1 << (start + offset);
        }

        if chunk.is_full() {
            let next = chunk.next.take();
            match prev {
                Some(prev) => self.chunks[prev].next = next,
                None => self.free_head = next,
            }
        }

        Some(SlotId::new(idx, start))
    }

    /// Free the given slot, returning its value.
    ///
    /// Slots outside of this box or slots that are not occupied are ignored.
    pub fn free_element(&mut self, id: SlotId) -> Option<T> {
        let chunk = self.chunks.get_mut(id.chunk())?;
        let was_full = chunk.is_full();
        let value = chunk.take(id.slot())?;
        if was_full {
            self.relink(id.chunk());
        }
        Some(value)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.chunks.get(id.chunk())?.slots[id.slot()].as_ref()
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.chunks.get_mut(id.chunk())?.slots[id.slot()].as_mut()
    }

    /// Mark an occupied slot as reachable. Returns `true` if the slot was not
    /// marked before.
    pub fn mark(&mut self, id: SlotId) -> bool {
        let Some(chunk) = self.chunks.get_mut(id.chunk()) else {
            return false;
        };
        let bit = id.bit();
        if chunk.used & bit == 0 || chunk.mark & bit != 0 {
            return false;
        }
        chunk.mark |= bit;
        true
    }

    pub fn is_marked(&self, id: SlotId) -> bool {
        self.chunks
            .get(id.chunk())
            .map_or(false, |chunk| chunk.mark & id.bit() != 0)
    }

    /// Clear the mark bitmap of every chunk.
    pub fn reset_marks(&mut self) {
        for chunk in &mut self.chunks {
            chunk.mark = 0;
        }
    }

    /// Sweep every chunk, freeing all occupied slots that are not marked.
    ///
    /// The swept values are returned instead of dropped, so the caller can
    /// drop them after releasing any borrow of this box.
    pub fn collect_chunks(&mut self) -> Vec<T> {
        let mut swept = Vec::new();
        for idx in 0..self.chunks.len() {
            let chunk = &mut self.chunks[idx];
            let dead = chunk.used & !chunk.mark;
            if dead == 0 {
                continue;
            }

            let was_full = chunk.is_full();
            let mut bits = dead;
            while bits != 0 {
                let slot = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                swept.extend(chunk.slots[slot].take());
            }
            chunk.used &= !dead;

            if was_full {
                self.relink(idx);
            }
        }
        swept
    }

    /// Remove every value from this box, releasing all chunks.
    pub fn drain(&mut self) -> Vec<T> {
        self.free_head = None;
        std::mem::take(&mut self.chunks)
            .into_iter()
            .flat_map(|chunk| chunk.slots)
            .flatten()
            .collect()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| chunk.used.count_ones() as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes of slot storage reserved by all chunks.
    pub fn reserved_size_bytes(&self) -> usize {
        self.chunks.len() * CHUNK_SLOTS * size_of::<Option<T>>()
    }

    /// Bytes of slot storage currently occupied.
    pub fn live_size_bytes(&self) -> usize {
        self.len() * size_of::<Option<T>>()
    }
}
