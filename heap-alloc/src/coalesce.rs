//! # Coalescing
//!
//! Merges a newly-freed block with free physical neighbors, eagerly: no two
//! adjacent blocks are ever both free at a point observable between API
//! calls. Four cases, keyed on the neighbors' allocation state, per the
//! reference table in the block-design notes.

use crate::free_list;
use crate::nav::{footer_addr, header_addr, next_block, prev_block};
use crate::size_class::class_of;
use crate::tag::{Tag, read_tag, write_tag};

/// Coalesces the free block `bp` (header and, if applicable, footer already
/// written with `alloc = false`) with any free physical neighbors, then
/// inserts the resulting block into its new size class's free list.
///
/// Returns the payload pointer of the (possibly merged) free block.
///
/// # Safety
/// `bp` must be a free block with a valid header/footer, not yet on any
/// free list. The heap's prologue/epilogue sentinels must be intact so that
/// neighbor lookups never run off either end.
pub(crate) unsafe fn coalesce(base: *mut u8, listp: *mut u8, bp: *mut u8) -> *mut u8 {
    let header = unsafe { header_addr(bp) };
    let tag = unsafe { read_tag(header) };
    let mut size = tag.size();
    let prev_alloc = tag.prev_alloc();

    let next = unsafe { next_block(bp, size) };
    let next_tag = unsafe { read_tag(header_addr(next)) };

    let bp = if prev_alloc && next_tag.alloc() {
        let next_tag = next_tag.with_prev_alloc(false);
        unsafe { write_tag(header_addr(next), next_tag) };
        bp
    } else if prev_alloc && !next_tag.alloc() {
        size += next_tag.size();
        unsafe { free_list::delete(base, next) };
        let merged = Tag::pack(size, true, false);
        unsafe {
            write_tag(header, merged);
            write_tag(footer_addr(bp, size), merged);
        }
        bp
    } else if !prev_alloc && next_tag.alloc() {
        let prev = unsafe { prev_block(bp) };
        let prev_header = unsafe { header_addr(prev) };
        let prev_tag = unsafe { read_tag(prev_header) };
        size += prev_tag.size();
        unsafe { free_list::delete(base, prev) };

        let merged = Tag::pack(size, prev_tag.prev_alloc(), false);
        unsafe {
            write_tag(prev_header, merged);
            write_tag(footer_addr(prev, size), merged);
            let next_tag = next_tag.with_prev_alloc(false);
            write_tag(header_addr(next), next_tag);
        }
        prev
    } else {
        let prev = unsafe { prev_block(bp) };
        let prev_header = unsafe { header_addr(prev) };
        let prev_tag = unsafe { read_tag(prev_header) };
        size += prev_tag.size() + next_tag.size();
        unsafe {
            free_list::delete(base, prev);
            free_list::delete(base, next);
        }

        let merged = Tag::pack(size, prev_tag.prev_alloc(), false);
        unsafe {
            write_tag(prev_header, merged);
            write_tag(footer_addr(prev, size), merged);
        }
        prev
    };

    let size = unsafe { read_tag(header_addr(bp)) }.size();
    unsafe { free_list::insert(base, listp, class_of(size), bp) };
    bp
}
