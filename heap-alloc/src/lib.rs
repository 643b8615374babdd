//! # Segregated Boundary-Tag Heap Allocator
//!
//! A general-purpose dynamic memory allocator over a single, contiguous,
//! monotonically growable heap region. It never talks to an operating
//! system directly — it is generic over a [`MemoryLayer`], a lower
//! component that hands out byte ranges on request, analogous to a hosted
//! C allocator's `sbrk`.
//!
//! ## Block format
//!
//! Every block carries a 4-byte header (size, `alloc`, `prev_alloc`);
//! free blocks additionally carry a matching 4-byte footer, overlaying
//! their first 8 payload bytes with `next`/`prev` free-list links stored as
//! 32-bit offsets from the heap base. Allocated blocks have neither a
//! footer nor list links — the `prev_alloc` bit in the *following* block's
//! header takes over the footer's one useful role (finding a predecessor's
//! size) whenever that predecessor is allocated. See [`tag`] and [`nav`].
//!
//! ## Free-list directory
//!
//! Ten size-segregated circular doubly-linked free lists, with sentinels
//! embedded in the heap's prologue block. See [`size_class`] and
//! [`free_list`].
//!
//! ## Placement and coalescing
//!
//! [`placement::find_fit`] is first-fit for small size classes and best-fit
//! for large ones; [`coalesce::coalesce`] eagerly merges a freed block with
//! any free physical neighbor. [`extend::extend_heap`] grows the heap when
//! no free block fits.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                     HeapAllocator                 │
//! │   alloc / free / resize / zeroed_alloc / check    │
//! └──────────────┬─────────────────────┬──────────────┘
//!                │                     │
//! ┌──────────────▼──────────┐ ┌────────▼─────────────┐
//! │  placement / coalesce    │ │   free_list directory │
//! │  (find a block, merge)   │ │  (10 segregated lists) │
//! └──────────────┬───────────┘ └────────┬──────────────┘
//!                │                      │
//! ┌──────────────▼──────────────────────▼──────────────┐
//! │         tag codec + block navigation                │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//! ┌──────────────────────────▼───────────────────────────┐
//! │                     MemoryLayer                       │
//! │   request() / heap_low() / heap_high() — the "sbrk"   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Single-threaded and synchronous by design — no operation suspends, and
//! there is no internal locking. An embedder sharing one [`HeapAllocator`]
//! across threads must add its own mutual exclusion around the whole API.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod check;
mod coalesce;
mod extend;
mod free_list;
mod memlayer;
mod nav;
mod placement;
mod size_class;
mod tag;

use core::ptr::NonNull;

pub use check::ConsistencyViolation;
pub use memlayer::{LayerError, MemoryLayer};
#[cfg(any(test, feature = "std"))]
pub use memlayer::VecMemoryLayer;

/// Word size: the width of a header, footer, or free-list link field.
pub(crate) const WSIZE: usize = 4;
/// Double-word size: the mandatory alignment and the minimum useful
/// increment (a sentinel pair, or the gap between a block's header and its
/// footer's size field).
pub(crate) const DSIZE: usize = 8;
/// Mandatory payload alignment.
pub const ALIGNMENT: usize = 8;
/// Smallest possible block size: enough for a header, 8 bytes of free-list
/// links (or user payload), and a footer sharing those same 8 bytes.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;
/// Default heap-extension granularity when no free block fits a request.
pub const CHUNKSIZE: usize = 4096;
/// Initial heap seed, expressed as a multiple of [`CHUNKSIZE`], requested
/// once at construction time to avoid pathological early fragmentation.
pub const INIT_SEED_CHUNKS: usize = 8;

/// Rounds `n` up to the next multiple of `align` (`align` must be a power
/// of two).
#[inline]
pub(crate) const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Converts a user-requested byte count into the block size that must be
/// carved out for it (header included), per §4.8: sizes up to 12 bytes
/// still need the 16-byte minimum block; above that, round `n + WSIZE` up
/// to the alignment.
#[inline]
fn block_size_for(n: usize) -> u32 {
    if n <= DSIZE + WSIZE {
        MIN_BLOCK_SIZE as u32
    } else {
        align_up(n + WSIZE, ALIGNMENT) as u32
    }
}

/// A segregated, boundary-tag heap allocator over a [`MemoryLayer`] `L`.
pub struct HeapAllocator<L: MemoryLayer> {
    layer: L,
    /// Address of the very first heap byte (the alignment pad).
    base: *mut u8,
    /// Payload pointer of the prologue block; also the address of free
    /// list 0's sentinel.
    listp: *mut u8,
}

// Safety: all state is owned raw pointers into memory owned by `layer`,
// itself part of `Self`; nothing here is aliased elsewhere. The type is not
// `Sync` — see the crate-level docs on the concurrency (non-)model.
unsafe impl<L: MemoryLayer + Send> Send for HeapAllocator<L> {}

impl<L: MemoryLayer> HeapAllocator<L> {
    /// Builds a fresh heap over `layer`: installs the prologue (header,
    /// `LIST_NUM` empty sentinel pairs, footer) and epilogue, then extends
    /// the heap once by `INIT_SEED_CHUNKS * CHUNKSIZE` bytes to avoid
    /// pathological early fragmentation.
    ///
    /// # Errors
    /// Propagates [`LayerError`] if `layer` cannot supply the initial
    /// prologue/epilogue region or the seed extension.
    pub fn new(mut layer: L) -> Result<Self, LayerError> {
        let prologue_size = (2 * size_class::LIST_NUM + 2) * WSIZE;

        let base = layer.request(prologue_size + DSIZE)?.as_ptr();
        let listp = unsafe { base.add(DSIZE) };

        unsafe {
            tag::write_tag(base, tag::Tag::pack(0, false, false));
            tag::write_tag(
                base.add(WSIZE),
                tag::Tag::pack(prologue_size as u32, true, true),
            );

            for index in 0..size_class::LIST_NUM {
                free_list::init_sentinel(base, listp, index);
            }

            let prologue_tag = tag::Tag::pack(prologue_size as u32, true, true);
            tag::write_tag(nav::footer_addr(listp, prologue_size as u32), prologue_tag);
            tag::write_tag(
                nav::header_addr(nav::next_block(listp, prologue_size as u32)),
                tag::Tag::pack(0, true, true),
            );
        }

        let mut allocator = Self { layer, base, listp };
        unsafe {
            extend::extend_heap(
                allocator.base,
                allocator.listp,
                &mut allocator.layer,
                INIT_SEED_CHUNKS * CHUNKSIZE,
            )?;
        }
        Ok(allocator)
    }

    /// Allocates at least `n` bytes, 8-byte aligned. Returns `None` for
    /// `n == 0` (a contractual no-op, not an error) or if the heap cannot
    /// be extended far enough.
    pub fn alloc(&mut self, n: usize) -> Option<NonNull<u8>> {
        if n == 0 {
            return None;
        }
        let asize = block_size_for(n);

        let bp = match unsafe { placement::find_fit(self.base, self.listp, asize) } {
            Some(bp) => bp,
            None => {
                let extend_size = asize.max(CHUNKSIZE as u32) as usize;
                unsafe { extend::extend_heap(self.base, self.listp, &mut self.layer, extend_size) }
                    .ok()?
            }
        };

        unsafe { placement::place(self.base, self.listp, bp, asize) };
        NonNull::new(bp)
    }

    /// Releases a previously allocated block. `None` is a no-op. Freeing a
    /// pointer not returned by this allocator, or double-freeing, is
    /// undefined behavior and is not checked here — see [`Self::check_heap`].
    pub fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };
        let bp = ptr.as_ptr();
        debug_assert!(
            (bp as *const u8) >= self.layer.heap_low() && (bp as *const u8) < self.layer.heap_high(),
            "free() called with a pointer outside the heap"
        );
        let header = unsafe { nav::header_addr(bp) };
        let tag = unsafe { tag::read_tag(header) };
        let size = tag.size();
        let free_tag = tag::Tag::pack(size, tag.prev_alloc(), false);
        unsafe {
            tag::write_tag(header, free_tag);
            tag::write_tag(nav::footer_addr(bp, size), free_tag);
            coalesce::coalesce(self.base, self.listp, bp);
        }
    }

    /// Resizes a previously allocated block to at least `n` bytes.
    ///
    /// `ptr == None` behaves as [`Self::alloc`]; `n == 0` behaves as
    /// [`Self::free`] and returns `None`. Shrinking never splits the block
    /// in place (by design, to avoid fragmenting under shrink-heavy
    /// workloads); growing absorbs a following free block in place when
    /// possible, otherwise falls back to allocate, copy, free.
    pub fn resize(&mut self, ptr: Option<NonNull<u8>>, n: usize) -> Option<NonNull<u8>> {
        let Some(ptr) = ptr else {
            return self.alloc(n);
        };
        if n == 0 {
            self.free(Some(ptr));
            return None;
        }

        let bp = ptr.as_ptr();
        debug_assert!(
            (bp as *const u8) >= self.layer.heap_low() && (bp as *const u8) < self.layer.heap_high(),
            "resize() called with a pointer outside the heap"
        );
        let old_header = unsafe { nav::header_addr(bp) };
        let old_tag = unsafe { tag::read_tag(old_header) };
        let old_size = old_tag.size();
        let asize = block_size_for(n);

        if asize <= old_size {
            return Some(ptr);
        }

        if let Some(grown) = unsafe { self.try_grow_in_place(bp, old_size, old_tag, asize) } {
            return Some(grown);
        }

        let new_ptr = self.alloc(n)?;
        let copy_len = (old_size as usize - WSIZE).min(n);
        unsafe {
            core::ptr::copy_nonoverlapping(bp, new_ptr.as_ptr(), copy_len);
        }
        self.free(Some(ptr));
        Some(new_ptr)
    }

    /// Attempts to grow the block at `bp` in place by absorbing a following
    /// free block, per the grow-in-place rule in [`Self::resize`].
    ///
    /// # Safety
    /// `bp` must be a live allocated block with header tag `old_tag` and
    /// size `old_size`; `asize` must exceed `old_size`.
    unsafe fn try_grow_in_place(
        &mut self,
        bp: *mut u8,
        old_size: u32,
        old_tag: tag::Tag,
        asize: u32,
    ) -> Option<NonNull<u8>> {
        let next = unsafe { nav::next_block(bp, old_size) };
        let next_tag = unsafe { tag::read_tag(nav::header_addr(next)) };
        if next_tag.alloc() {
            return None;
        }

        let total = old_size + next_tag.size();
        if total < asize {
            return None;
        }

        unsafe { free_list::delete(self.base, next) };
        let surplus = total - asize;
        if surplus >= MIN_BLOCK_SIZE as u32 {
            unsafe {
                tag::write_tag(
                    nav::header_addr(bp),
                    tag::Tag::pack(asize, old_tag.prev_alloc(), true),
                );
                let tail = bp.add(asize as usize);
                let tail_tag = tag::Tag::pack(surplus, true, false);
                tag::write_tag(nav::header_addr(tail), tail_tag);
                tag::write_tag(nav::footer_addr(tail, surplus), tail_tag);
                free_list::insert(self.base, self.listp, size_class::class_of(surplus), tail);
            }
        } else {
            unsafe {
                tag::write_tag(
                    nav::header_addr(bp),
                    tag::Tag::pack(total, old_tag.prev_alloc(), true),
                );
                let after = nav::next_block(bp, total);
                let after_tag = tag::read_tag(nav::header_addr(after)).with_prev_alloc(true);
                tag::write_tag(nav::header_addr(after), after_tag);
            }
        }

        NonNull::new(bp)
    }

    /// Allocates space for `count` elements of `size` bytes each and zeroes
    /// the entire payload. Returns `None` if `count * size` overflows
    /// `usize`, or if the underlying allocation fails.
    pub fn zeroed_alloc(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let bytes = count.checked_mul(size)?;
        let ptr = self.alloc(bytes)?;
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, bytes) };
        Some(ptr)
    }

    /// Verifies every invariant in the block-design notes by walking the
    /// heap once and every free list once. Read-only; returns the first
    /// violation found, if any. Set `verbose` to additionally log one line
    /// per visited block.
    pub fn check_heap(&self, verbose: bool) -> Result<(), ConsistencyViolation> {
        match unsafe {
            check::check_heap(
                self.base,
                self.listp,
                self.layer.heap_low(),
                self.layer.heap_high(),
                verbose,
            )
        } {
            Some(violation) => {
                log::error!("heap consistency check failed: {violation}");
                Err(violation)
            }
            None => Ok(()),
        }
    }
}
