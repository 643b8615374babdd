//! # Free-List Directory
//!
//! Maintains [`crate::size_class::LIST_NUM`] circular doubly-linked free
//! lists. Each list has a sentinel node living inside the prologue body
//! (installed by [`crate::HeapAllocator::new`]); `next == self` denotes an
//! empty list.
//!
//! Every node — sentinel or real free block — is an 8-byte structure at some
//! address `addr`: the first 4 bytes hold `next`, the next 4 hold `prev`,
//! both stored as **32-bit byte offsets from `base`** (not absolute
//! pointers), per the design's 4 GiB heap bound. For a real free block,
//! `addr` is the block's payload pointer, so these fields overlay the first
//! 8 payload bytes — valid only while the block is free.

use crate::WSIZE;

#[inline]
unsafe fn read_u32(addr: *const u8) -> u32 {
    unsafe { addr.cast::<u32>().read_unaligned() }
}

#[inline]
unsafe fn write_u32(addr: *mut u8, val: u32) {
    unsafe { addr.cast::<u32>().write_unaligned(val) };
}

/// Byte offset of `addr` from `base`, as stored in a link field.
#[inline]
pub(crate) fn offset_of(base: *mut u8, addr: *mut u8) -> u32 {
    debug_assert!((addr as usize) >= (base as usize));
    (addr as usize - base as usize) as u32
}

/// Resolves a link field's stored offset back into an address.
#[inline]
pub(crate) fn addr_of(base: *mut u8, offset: u32) -> *mut u8 {
    unsafe { base.add(offset as usize) }
}

/// The node at `addr`'s `next` link, resolved to an address.
#[inline]
pub(crate) unsafe fn next_in_list(base: *mut u8, addr: *mut u8) -> *mut u8 {
    addr_of(base, unsafe { read_u32(addr) })
}

/// The node at `addr`'s `prev` link, resolved to an address.
#[inline]
pub(crate) unsafe fn prev_in_list(base: *mut u8, addr: *mut u8) -> *mut u8 {
    addr_of(base, unsafe { read_u32(addr.add(WSIZE)) })
}

#[inline]
unsafe fn set_next(base: *mut u8, addr: *mut u8, target: *mut u8) {
    unsafe { write_u32(addr, offset_of(base, target)) };
}

#[inline]
unsafe fn set_prev(base: *mut u8, addr: *mut u8, target: *mut u8) {
    unsafe { write_u32(addr.add(WSIZE), offset_of(base, target)) };
}

/// Address of the sentinel node for list `index`, embedded in the prologue
/// body starting at `listp` (the prologue's payload pointer).
#[inline]
pub(crate) unsafe fn sentinel(listp: *mut u8, index: usize) -> *mut u8 {
    unsafe { listp.add(index * 2 * WSIZE) }
}

/// Initializes list `index`'s sentinel as an empty, self-looped node.
///
/// # Safety
/// `listp` must point at the live prologue body and `index < LIST_NUM`.
pub(crate) unsafe fn init_sentinel(base: *mut u8, listp: *mut u8, index: usize) {
    let s = unsafe { sentinel(listp, index) };
    unsafe {
        set_next(base, s, s);
        set_prev(base, s, s);
    }
}

/// Inserts `bp` (a free block's payload pointer) at the head of list
/// `index`, immediately after its sentinel (LIFO).
///
/// # Safety
/// `bp` must be a free block not currently on any list, with at least 8
/// payload bytes available to overlay the link fields.
pub(crate) unsafe fn insert(base: *mut u8, listp: *mut u8, index: usize, bp: *mut u8) {
    let s = unsafe { sentinel(listp, index) };
    let old_first = unsafe { next_in_list(base, s) };
    unsafe {
        set_next(base, bp, old_first);
        set_prev(base, bp, s);
        set_prev(base, old_first, bp);
        set_next(base, s, bp);
    }
}

/// Unlinks `bp` from whichever list it is currently on.
///
/// # Safety
/// `bp` must currently be a member of exactly one free list.
pub(crate) unsafe fn delete(base: *mut u8, bp: *mut u8) {
    let n = unsafe { next_in_list(base, bp) };
    let p = unsafe { prev_in_list(base, bp) };
    unsafe {
        set_prev(base, n, p);
        set_next(base, p, n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny in-memory arena standing in for the heap, just to exercise
    /// the link bookkeeping in isolation from block headers/footers.
    struct Arena {
        buf: Vec<u8>,
    }

    impl Arena {
        fn new(nodes: usize) -> Self {
            // One sentinel (slot 0) plus `nodes` free-block stand-ins, each
            // 8 bytes (next + prev).
            Self {
                buf: vec![0u8; (nodes + 1) * 8],
            }
        }

        fn base(&mut self) -> *mut u8 {
            self.buf.as_mut_ptr()
        }

        fn slot(&mut self, i: usize) -> *mut u8 {
            unsafe { self.base().add(i * 8) }
        }
    }

    #[test]
    fn empty_list_self_loops() {
        let mut arena = Arena::new(2);
        let base = arena.base();
        let listp = base;
        unsafe {
            init_sentinel(base, listp, 0);
            let s = sentinel(listp, 0);
            assert_eq!(next_in_list(base, s), s);
            assert_eq!(prev_in_list(base, s), s);
        }
    }

    #[test]
    fn insert_then_delete_restores_empty_list() {
        let mut arena = Arena::new(2);
        let base = arena.base();
        let listp = base;
        unsafe {
            init_sentinel(base, listp, 0);
        }
        let s = unsafe { sentinel(listp, 0) };
        let a = arena.slot(1);
        let b = arena.slot(2);

        unsafe {
            insert(base, listp, 0, a);
            insert(base, listp, 0, b);

            // LIFO: b is head, then a, then back to sentinel.
            assert_eq!(next_in_list(base, s), b);
            assert_eq!(next_in_list(base, b), a);
            assert_eq!(next_in_list(base, a), s);
            assert_eq!(prev_in_list(base, s), a);
            assert_eq!(prev_in_list(base, b), s);
            assert_eq!(prev_in_list(base, a), b);

            delete(base, b);
            assert_eq!(next_in_list(base, s), a);
            assert_eq!(prev_in_list(base, a), s);

            delete(base, a);
            assert_eq!(next_in_list(base, s), s);
            assert_eq!(prev_in_list(base, s), s);
        }
    }
}
