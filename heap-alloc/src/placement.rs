//! # Placement: find_fit + place
//!
//! Selects a free block for a request (`find_fit`) and carves it down to
//! size (`place`). Policy is hybrid: small size classes use first-fit for
//! speed, large classes use best-fit to limit the internal fragmentation
//! that dominates for infrequent, large requests.

use crate::free_list::{self, next_in_list, sentinel};
use crate::nav::{footer_addr, header_addr};
use crate::size_class::{LIST_NUM, LIST_TRSH, class_of};
use crate::tag::{Tag, read_tag, write_tag};
use crate::MIN_BLOCK_SIZE;

/// Scans the free lists for a block of at least `asize` bytes.
///
/// Starting from `asize`'s own size class, scans that list and every larger
/// class in ascending order. Classes at or below [`LIST_TRSH`] are scanned
/// first-fit (first sufficiently large block wins); classes above it are
/// scanned best-fit across all remaining lists (the smallest sufficiently
/// large block wins). Returns `None` if no block fits.
///
/// # Safety
/// `base`/`listp` must describe a live, well-formed heap.
pub(crate) unsafe fn find_fit(base: *mut u8, listp: *mut u8, asize: u32) -> Option<*mut u8> {
    let start = class_of(asize);

    if start > LIST_TRSH {
        let mut best: Option<(*mut u8, u32)> = None;
        for index in start..LIST_NUM {
            let s = unsafe { sentinel(listp, index) };
            let mut node = unsafe { next_in_list(base, s) };
            while node != s {
                let size = unsafe { read_tag(header_addr(node)) }.size();
                if size >= asize && best.is_none_or(|(_, best_size)| size < best_size) {
                    best = Some((node, size));
                }
                node = unsafe { next_in_list(base, node) };
            }
        }
        best.map(|(bp, _)| bp)
    } else {
        for index in start..LIST_NUM {
            let s = unsafe { sentinel(listp, index) };
            let mut node = unsafe { next_in_list(base, s) };
            while node != s {
                let size = unsafe { read_tag(header_addr(node)) }.size();
                if size >= asize {
                    return Some(node);
                }
                node = unsafe { next_in_list(base, node) };
            }
        }
        None
    }
}

/// Removes `bp` from its free list and carves out `asize` bytes for
/// allocation, splitting off and reinserting the remainder if it is large
/// enough to form a free block of its own.
///
/// # Safety
/// `bp` must be a free block of size `>= asize` currently on a free list.
pub(crate) unsafe fn place(base: *mut u8, listp: *mut u8, bp: *mut u8, asize: u32) {
    let header = unsafe { header_addr(bp) };
    let tag = unsafe { read_tag(header) };
    let csize = tag.size();
    let prev_alloc = tag.prev_alloc();

    unsafe { free_list::delete(base, bp) };

    let remainder = csize - asize;
    if remainder >= MIN_BLOCK_SIZE as u32 {
        unsafe { write_tag(header, Tag::pack(asize, prev_alloc, true)) };

        let next = unsafe { bp.add(asize as usize) };
        let next_header = unsafe { header_addr(next) };
        let free_tag = Tag::pack(remainder, true, false);
        unsafe {
            write_tag(next_header, free_tag);
            write_tag(footer_addr(next, remainder), free_tag);
            free_list::insert(base, listp, class_of(remainder), next);
        }
    } else {
        unsafe { write_tag(header, Tag::pack(csize, prev_alloc, true)) };
        let next = unsafe { bp.add(csize as usize) };
        let next_header = unsafe { header_addr(next) };
        let next_tag = unsafe { read_tag(next_header) }.with_prev_alloc(true);
        unsafe { write_tag(next_header, next_tag) };
    }
}
