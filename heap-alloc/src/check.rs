//! # Consistency Checker
//!
//! Walks the heap from prologue to epilogue, and every free list, verifying
//! the invariants listed in the block-design notes. Read-only: never
//! mutates allocator state. Intended for debug builds; the hot allocation
//! and free paths never call it.

use crate::free_list::{next_in_list, prev_in_list, sentinel};
use crate::nav::{footer_addr, header_addr, next_block};
use crate::size_class::{LIST_NUM, class_of};
use crate::tag::read_tag;
use crate::{ALIGNMENT, MIN_BLOCK_SIZE};

/// The first invariant violation the checker encountered.
#[derive(Debug, thiserror::Error)]
pub enum ConsistencyViolation {
    /// A block's size is not a multiple of 8, or is below the 16-byte
    /// minimum (invariant 1).
    #[error("block at {addr:?} has size {size}, which is not a multiple of 8 or is below the 16-byte minimum")]
    BadBlockSize { addr: *const u8, size: u32 },
    /// A payload pointer is not 8-byte aligned (invariant 2).
    #[error("payload at {addr:?} is not 8-byte aligned")]
    Misaligned { addr: *const u8 },
    /// A payload pointer lies outside the live heap range (invariant 2).
    #[error("payload at {addr:?} lies outside the heap")]
    OutOfHeapBounds { addr: *const u8 },
    /// A free block's header and footer disagree on size or alloc
    /// (invariant 3).
    #[error("free block at {addr:?} disagrees between header and footer")]
    HeaderFooterMismatch { addr: *const u8 },
    /// A block's `prev_alloc` bit does not match its predecessor's actual
    /// `alloc` bit (invariant 4).
    #[error(
        "block at {addr:?} has prev_alloc={stored} but the previous block's alloc bit is {actual}"
    )]
    PrevAllocMismatch {
        addr: *const u8,
        stored: bool,
        actual: bool,
    },
    /// Two physically adjacent blocks are both free (invariant 5).
    #[error("blocks at {first:?} and {second:?} are adjacent and both free")]
    AdjacentFreeBlocks { first: *const u8, second: *const u8 },
    /// A free block sits in the wrong size class's list (invariant 7).
    #[error("free block at {addr:?} of size {size} sits in list {index} but belongs in list {expected}")]
    WrongSizeClass {
        addr: *const u8,
        size: u32,
        index: usize,
        expected: usize,
    },
    /// A node reached by walking a free list has its `alloc` bit set
    /// (invariant 6).
    #[error("free list {index} contains allocated node at {addr:?}")]
    ListNodeNotFree { index: usize, addr: *const u8 },
    /// A free list's links do not form a proper circular list (invariant 8).
    #[error("free list {index} is not properly circular at {addr:?}")]
    BrokenCircularity { index: usize, addr: *const u8 },
    /// The number of free blocks found walking the heap does not match the
    /// number found walking the free lists (invariant 6/7 combined).
    #[error("heap walk found {heap_free} free blocks but the free lists contain {list_free}")]
    FreeCountMismatch { heap_free: usize, list_free: usize },
    /// The prologue or epilogue's `alloc` bit is not set (invariant 9).
    #[error("prologue or epilogue at {addr:?} is not marked allocated")]
    PrologueOrEpilogueNotAllocated { addr: *const u8 },
}

/// Walks the whole heap, verifying every invariant. Returns the first
/// violation found, or `None` if the heap is consistent.
///
/// `listp` is the prologue's payload pointer (see [`crate::HeapAllocator::new`]);
/// `heap_low`/`heap_high` bound the live heap for the alignment/in-heap
/// check. When `verbose`, logs one `debug` line per visited block.
///
/// # Safety
/// The heap described by `listp` must be well-formed up to (but possibly
/// including, if that is the violation) the point of any invariant failure.
pub(crate) unsafe fn check_heap(
    base: *mut u8,
    listp: *mut u8,
    heap_low: *const u8,
    heap_high: *const u8,
    verbose: bool,
) -> Option<ConsistencyViolation> {
    let prologue_tag = unsafe { read_tag(header_addr(listp)) };
    if !prologue_tag.alloc() {
        return Some(ConsistencyViolation::PrologueOrEpilogueNotAllocated {
            addr: unsafe { header_addr(listp) },
        });
    }

    let mut heap_free = 0usize;
    let mut bp = unsafe { next_block(listp, prologue_tag.size()) };
    let mut prev_alloc_actual = true; // prologue is always allocated

    loop {
        // Validate bp itself before dereferencing it: a corrupted size a few
        // iterations back can walk bp past the end of the heap, and reading
        // through it would be UB rather than a reportable violation.
        if (bp as usize) % ALIGNMENT != 0 {
            return Some(ConsistencyViolation::Misaligned { addr: bp });
        }
        if (bp as *const u8) < heap_low || (bp as *const u8) >= heap_high {
            return Some(ConsistencyViolation::OutOfHeapBounds { addr: bp });
        }

        let tag = unsafe { read_tag(header_addr(bp)) };
        let size = tag.size();

        if size == 0 {
            // Epilogue reached.
            if !tag.alloc() {
                return Some(ConsistencyViolation::PrologueOrEpilogueNotAllocated {
                    addr: unsafe { header_addr(bp) },
                });
            }
            break;
        }

        if verbose {
            log::debug!(
                "block {:?}: size={} alloc={} prev_alloc={}",
                bp,
                size,
                tag.alloc(),
                tag.prev_alloc()
            );
        }

        if size % ALIGNMENT as u32 != 0 || size < MIN_BLOCK_SIZE as u32 {
            return Some(ConsistencyViolation::BadBlockSize { addr: bp, size });
        }
        if tag.prev_alloc() != prev_alloc_actual {
            return Some(ConsistencyViolation::PrevAllocMismatch {
                addr: bp,
                stored: tag.prev_alloc(),
                actual: prev_alloc_actual,
            });
        }

        if !tag.alloc() {
            heap_free += 1;
            let footer = unsafe { read_tag(footer_addr(bp, size)) };
            if footer.size() != size || footer.alloc() {
                return Some(ConsistencyViolation::HeaderFooterMismatch { addr: bp });
            }
            if !prev_alloc_actual {
                // Our own predecessor is free too — but that would have
                // already been caught as an adjacent-free pair when we
                // visited the predecessor, unless we are ourselves the
                // second half of the very first such pair.
                let prev_payload = unsafe { crate::nav::prev_block(bp) };
                return Some(ConsistencyViolation::AdjacentFreeBlocks {
                    first: prev_payload,
                    second: bp,
                });
            }
        }

        prev_alloc_actual = tag.alloc();
        bp = unsafe { next_block(bp, size) };
    }

    let mut list_free = 0usize;
    for index in 0..LIST_NUM {
        let s = unsafe { sentinel(listp, index) };
        let mut node = unsafe { next_in_list(base, s) };
        while node != s {
            if unsafe { prev_in_list(base, next_in_list(base, node)) } != node {
                return Some(ConsistencyViolation::BrokenCircularity { index, addr: node });
            }
            let tag = unsafe { read_tag(header_addr(node)) };
            if tag.alloc() {
                return Some(ConsistencyViolation::ListNodeNotFree { index, addr: node });
            }
            let expected = class_of(tag.size());
            if expected != index {
                return Some(ConsistencyViolation::WrongSizeClass {
                    addr: node,
                    size: tag.size(),
                    index,
                    expected,
                });
            }
            list_free += 1;
            node = unsafe { next_in_list(base, node) };
        }
    }

    if heap_free != list_free {
        return Some(ConsistencyViolation::FreeCountMismatch {
            heap_free,
            list_free,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_list;
    use crate::memlayer::VecMemoryLayer;
    use crate::tag::{Tag, write_tag};
    use crate::{HeapAllocator, MemoryLayer};

    fn harness() -> HeapAllocator<VecMemoryLayer> {
        HeapAllocator::new(VecMemoryLayer::with_capacity(4 << 20))
            .expect("harness capacity is ample for these tests")
    }

    #[test]
    fn detects_undersized_block() {
        let mut a = harness();
        let p = a.alloc(64).unwrap();
        a.free(Some(p));

        unsafe {
            let header = header_addr(p.as_ptr());
            write_tag(header, Tag::pack(8, true, false));
        }

        let result = a.check_heap(false);
        assert!(matches!(
            result,
            Err(ConsistencyViolation::BadBlockSize { size: 8, .. })
        ));
    }

    #[test]
    fn detects_block_outside_heap_bounds() {
        let a = harness();
        let narrow_high = unsafe { a.layer.heap_low().add(8) };

        let result = unsafe { check_heap(a.base, a.listp, a.layer.heap_low(), narrow_high, false) };
        assert!(matches!(
            result,
            Some(ConsistencyViolation::OutOfHeapBounds { .. })
        ));
    }

    #[test]
    fn detects_prev_alloc_mismatch() {
        let mut a = harness();
        let _p1 = a.alloc(64).unwrap();
        let p2 = a.alloc(64).unwrap();

        unsafe {
            let header2 = header_addr(p2.as_ptr());
            let t2 = read_tag(header2);
            write_tag(header2, Tag::pack(t2.size(), false, t2.alloc()));
        }

        let result = a.check_heap(false);
        assert!(matches!(
            result,
            Err(ConsistencyViolation::PrevAllocMismatch { .. })
        ));
    }

    #[test]
    fn detects_adjacent_free_blocks() {
        let mut a = harness();
        let p1 = a.alloc(64).unwrap();
        let p2 = a.alloc(64).unwrap();
        a.free(Some(p1));

        // Mark p2 free directly, bypassing free()/coalesce(), so the heap
        // ends up with two physically adjacent free blocks.
        unsafe {
            let header2 = header_addr(p2.as_ptr());
            let t2 = read_tag(header2);
            let free_tag = Tag::pack(t2.size(), t2.prev_alloc(), false);
            write_tag(header2, free_tag);
            write_tag(footer_addr(p2.as_ptr(), t2.size()), free_tag);
        }

        let result = a.check_heap(false);
        assert!(matches!(
            result,
            Err(ConsistencyViolation::AdjacentFreeBlocks { .. })
        ));
    }

    #[test]
    fn detects_wrong_size_class() {
        let mut a = harness();
        let p1 = a.alloc(64).unwrap();
        a.free(Some(p1));

        let class = unsafe { class_of(read_tag(header_addr(p1.as_ptr())).size()) };
        let wrong_class = (class + 1) % LIST_NUM;

        unsafe {
            free_list::delete(a.base, p1.as_ptr());
            free_list::insert(a.base, a.listp, wrong_class, p1.as_ptr());
        }

        let result = a.check_heap(false);
        assert!(matches!(
            result,
            Err(ConsistencyViolation::WrongSizeClass { .. })
        ));
    }

    #[test]
    fn detects_broken_circularity() {
        let mut a = harness();
        let p1 = a.alloc(64).unwrap();
        let _mid1 = a.alloc(64).unwrap();
        let p2 = a.alloc(64).unwrap();
        let _mid2 = a.alloc(64).unwrap();
        a.free(Some(p1));
        a.free(Some(p2));

        // Re-inserting p1 at the head of its own list without deleting it
        // first corrupts the links left by the two legitimate inserts
        // above, without touching any block's header or footer.
        let class = unsafe { class_of(read_tag(header_addr(p1.as_ptr())).size()) };
        unsafe {
            free_list::insert(a.base, a.listp, class, p1.as_ptr());
        }

        let result = a.check_heap(false);
        assert!(matches!(
            result,
            Err(ConsistencyViolation::BrokenCircularity { .. })
        ));
    }
}
