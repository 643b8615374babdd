//! # Heap Extension
//!
//! Requests more bytes from the [`MemoryLayer`], seeds a single free block
//! over them, installs a fresh epilogue, and coalesces with whatever
//! preceded the old epilogue.

use crate::coalesce::coalesce;
use crate::memlayer::{LayerError, MemoryLayer};
use crate::nav::{footer_addr, header_addr};
use crate::tag::{Tag, read_tag, write_tag};
use crate::{ALIGNMENT, align_up};

/// Extends the heap by at least `bytes` bytes (rounded up to a multiple of
/// [`ALIGNMENT`]) and returns a pointer to the resulting, already-coalesced
/// free block.
///
/// # Errors
/// Propagates [`LayerError`] if the memory layer cannot grow. The heap is
/// left unmodified on failure.
///
/// # Safety
/// `base`/`listp` must describe a live, well-formed heap whose current high
/// end carries a valid epilogue header.
pub(crate) unsafe fn extend_heap<L: MemoryLayer>(
    base: *mut u8,
    listp: *mut u8,
    layer: &mut L,
    bytes: usize,
) -> Result<*mut u8, LayerError> {
    let size = align_up(bytes, ALIGNMENT) as u32;
    let bp = layer.request(size as usize)?.as_ptr();

    // The old epilogue occupied the four bytes immediately before `bp`; its
    // prev_alloc bit tells us whether the block physically preceding the
    // new region was allocated.
    let old_epilogue = unsafe { header_addr(bp) };
    let prev_alloc = unsafe { read_tag(old_epilogue) }.prev_alloc();

    let free_tag = Tag::pack(size, prev_alloc, false);
    unsafe {
        write_tag(old_epilogue, free_tag);
        write_tag(footer_addr(bp, size), free_tag);

        let new_epilogue = header_addr(bp.add(size as usize));
        write_tag(new_epilogue, Tag::pack(0, false, true));
    }

    Ok(unsafe { coalesce(base, listp, bp) })
}
