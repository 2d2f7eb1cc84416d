//! This module provides the raw buddy allocator and its support types.
//!
//! The "raw" allocator owns the heap buffer and the per-block tracking
//! table and implements the actual buddy algorithm: best-fit search,
//! region splitting, freeing and buddy coalescing. It works on `&mut self`
//! and leaves locking to the public wrapper type.
mod buffer;
mod tracking;

use buffer::Buffer;
use tracking::TrackMap;

use core::fmt;
use core::ptr::NonNull;

/// An error occurred when calling `free()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    /// The freed pointer lies outside of the heap memory.
    OutOfBounds,
    /// The region holding the freed pointer is not in use. Either the same
    /// allocation was freed twice or the pointer was never returned by
    /// [`alloc()`](RawBuddy::alloc).
    DoubleFree,
}

/// A raw buddy allocator over a statically-sized heap.
///
/// The heap is a contiguous array of `NBLOCKS` blocks of `BLOCK` bytes
/// each. At any point in time it is partitioned into *regions*: runs of
/// blocks whose length is a power of two and whose start block is a
/// multiple of that length. A region is free or in use as a whole. The
/// partition is tracked entirely in a side-table (see [`tracking`]), so the
/// heap bytes themselves carry no headers and allocations of the same size
/// pack without gaps.
///
/// Splitting a free region halves it; the two halves of a split are called
/// *buddies* and the buddy of the region of `len` blocks starting at block
/// `start` always starts at `start ^ len`. Freed regions re-merge with
/// their buddy whenever it is completely free, which bounds external
/// fragmentation deterministically: this is the reason to prefer a buddy
/// scheme over a plain first-fit allocator on realtime targets.
pub struct RawBuddy<const BLOCK: usize, const NBLOCKS: usize> {
    /// The per-block bookkeeping bits driving every operation.
    tracking: TrackMap<NBLOCKS>,
    /// The heap memory itself, never touched by the allocator.
    buffer: Buffer<BLOCK, NBLOCKS>,
}

impl<const BLOCK: usize, const NBLOCKS: usize> RawBuddy<BLOCK, NBLOCKS> {
    /// The total number of heap bytes managed by the allocator.
    pub const HEAP_SIZE: usize = BLOCK * NBLOCKS;

    /// Create a new [`RawBuddy`] managing a fully-free heap.
    ///
    /// # Panics
    /// This function panics if `BLOCK` or `NBLOCKS` is not a power of two
    /// or if the heap does not span at least two blocks.
    pub const fn new() -> Self {
        assert!(BLOCK.is_power_of_two(), "block size must be a power of two");
        assert!(
            NBLOCKS.is_power_of_two(),
            "block count must be a power of two"
        );
        assert!(NBLOCKS >= 2, "heap must span more than one block");

        Self {
            tracking: TrackMap::new(),
            buffer: Buffer::new(),
        }
    }

    /// Allocate a region of at least `count` contiguous bytes.
    ///
    /// The returned pointer addresses the first byte of a region whose size
    /// is `count` rounded up to the next power-of-two multiple of `BLOCK`
    /// and whose offset from the heap base is a multiple of that size. A
    /// zero-sized request still occupies one block, so distinct allocations
    /// never share an address.
    ///
    /// If no free region can satisfy the request, `None` is returned.
    ///
    /// # Algorithm
    /// The search walks the tracking table once, visiting every free region
    /// and selecting the *smallest* one that fits; among regions of equal
    /// size the one at the lowest address wins. Choosing the tightest fit
    /// keeps the number of splits (and with it the long-term fragmentation)
    /// minimal. The chosen region is then halved until it matches the
    /// requested size, marking the end of each split-off lower half, and
    /// finally all of its blocks are flagged in-use.
    pub fn alloc(&mut self, count: usize) -> Option<NonNull<u8>> {
        if count > Self::HEAP_SIZE {
            return None;
        }

        // blocks needed to hold `count` bytes; always at least one block
        let mut want = 1;
        while count > BLOCK * want {
            want <<= 1;
        }

        let (start, mut len) = self.find_best_fit(want)?;

        // split the region down to the required size; the upper half keeps
        // the original end marker, the lower half gains a new one
        while len > want {
            len /= 2;
            self.tracking.set_end(start + len - 1);
        }

        for block in start..start + want {
            self.tracking.set_used(block);
        }
        Some(self.buffer.block_ptr_mut(start))
    }

    /// Search for the smallest free region of at least `want` blocks.
    ///
    /// Returns the start block and length (in blocks) of the chosen region,
    /// or `None` if no free region fits. `want` must be a power of two.
    ///
    /// Free regions are recognized as runs of not-in-use blocks terminated
    /// by an end marker. Once a block rules out the current run (it is in
    /// use, or it ends a region), no candidate can start before the next
    /// multiple of `want`: any free region of `want` or more blocks starts
    /// at a multiple of its own length and therefore of `want`. The scan
    /// resumes there, skipping positions that could never yield a properly
    /// aligned region.
    fn find_best_fit(&self, want: usize) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        let mut span_start = 0;
        let mut block = 0;
        while block < NBLOCKS {
            if self.tracking.is_used(block) {
                span_start = (block & !(want - 1)) + want;
                block = span_start;
            } else if self.tracking.is_end(block) {
                let len = block - span_start + 1;
                if len >= want && best.map_or(true, |(_, best_len)| len < best_len) {
                    if len == want {
                        // an exact fit cannot be beaten
                        return Some((span_start, len));
                    }
                    best = Some((span_start, len));
                }
                span_start = (block & !(want - 1)) + want;
                block = span_start;
            } else {
                block += 1;
            }
        }
        best
    }

    /// Free a previously allocated region.
    ///
    /// `ptr` may address any byte of the region: it is normalized to the
    /// region's first block before any state changes, so the pointers
    /// handed out by the alignment-adjusting allocation paths release the
    /// whole region as well.
    ///
    /// # Algorithm
    /// The region start is recovered by walking the end markers backward.
    /// If its first block is not in use, the free is rejected without
    /// touching any state ([`FreeError::DoubleFree`]). Otherwise all blocks
    /// up to the end marker are cleared, and the region repeatedly merges
    /// with its buddy: the buddy of `len` blocks at `start` lives at
    /// `start ^ len` and is either one entire free region or (partially)
    /// in use, never something in between. Merging clears the end marker
    /// of the lower half and doubles the region, until a buddy is found in
    /// use or the region covers the whole heap.
    pub fn free(&mut self, ptr: *const u8) -> Result<(), FreeError> {
        let block = self.buffer.block_of(ptr).ok_or(FreeError::OutOfBounds)?;
        let mut start = self.region_start(block);
        if !self.tracking.is_used(start) {
            return Err(FreeError::DoubleFree);
        }

        let mut len = 0;
        for block in start..NBLOCKS {
            debug_assert!(self.tracking.is_used(block), "region partially in use");
            self.tracking.clear_used(block);
            len += 1;
            if self.tracking.is_end(block) {
                break;
            }
        }

        while len < NBLOCKS {
            let buddy = start ^ len;
            if (buddy..buddy + len).any(|block| self.tracking.is_used(block)) {
                break;
            }
            start = start.min(buddy);
            self.tracking.clear_end(start + len - 1);
            len <<= 1;
        }
        Ok(())
    }

    /// Find the first byte of the in-use region holding `ptr`.
    ///
    /// Returns `None` for pointers outside of the heap. For pointers into a
    /// free region the result is some block boundary without further
    /// meaning; no state is changed either way.
    pub fn start_of(&self, ptr: *const u8) -> Option<NonNull<u8>> {
        let block = self.buffer.block_of(ptr)?;
        Some(self.buffer.block_ptr(self.region_start(block)))
    }

    /// Walk backward from `block` to the first block of its region.
    fn region_start(&self, mut block: usize) -> usize {
        while block > 0 && !self.tracking.is_end(block - 1) {
            block -= 1;
        }
        block
    }

    /// The address of the first heap byte.
    pub fn heap_base(&self) -> NonNull<u8> {
        self.buffer.base()
    }

    /// The number of bytes currently allocated, counted in whole blocks.
    pub fn used_bytes(&self) -> usize {
        self.tracking.used_blocks() * BLOCK
    }

    /// Render the tracking table into `sink` for manual inspection.
    ///
    /// Emits two lines of `NBLOCKS` characters each: the usage map (`X` for
    /// in-use blocks) and the end-marker map (`|` for region ends).
    pub fn render_state<W: fmt::Write>(&self, sink: &mut W) -> fmt::Result {
        for block in 0..NBLOCKS {
            sink.write_char(if self.tracking.is_used(block) { 'X' } else { ' ' })?;
        }
        sink.write_char('\n')?;
        for block in 0..NBLOCKS {
            sink.write_char(if self.tracking.is_end(block) { '|' } else { ' ' })?;
        }
        sink.write_char('\n')
    }
}
