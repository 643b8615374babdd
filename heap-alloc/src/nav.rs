//! # Block Navigation
//!
//! Moves between a block's header, footer, and physically adjacent blocks.
//! All functions take and return payload pointers (the address returned to,
//! or previously returned to, the user) except where noted.
//!
//! Backward navigation ([`prev_block`]) is only valid when the previous
//! block is free (`prev_alloc == 0`); callers must check the current
//! block's `prev_alloc` bit first, since an allocated predecessor has no
//! footer to read a size from.

use crate::WSIZE;
use crate::tag::{Tag, read_tag};

/// Header address for the block whose payload starts at `payload`.
#[inline]
pub(crate) unsafe fn header_addr(payload: *mut u8) -> *mut u8 {
    unsafe { payload.sub(WSIZE) }
}

/// Footer address for a block of `size` bytes whose payload starts at
/// `payload`. Only meaningful for free blocks — allocated blocks do not
/// carry a footer.
#[inline]
pub(crate) unsafe fn footer_addr(payload: *mut u8, size: u32) -> *mut u8 {
    unsafe { payload.add(size as usize - 2 * WSIZE) }
}

/// Payload pointer of the block physically following `payload`, given its
/// own `size`.
#[inline]
pub(crate) unsafe fn next_block(payload: *mut u8, size: u32) -> *mut u8 {
    unsafe { payload.add(size as usize) }
}

/// Payload pointer of the block physically preceding `payload`.
///
/// # Safety
/// The caller must already know the previous block is free (its footer must
/// exist) — typically by having checked `read_tag(header_addr(payload)).prev_alloc()`.
#[inline]
pub(crate) unsafe fn prev_block(payload: *mut u8) -> *mut u8 {
    let prev_footer = unsafe { payload.sub(2 * WSIZE) };
    let prev_size = unsafe { read_tag(prev_footer) }.size();
    unsafe { payload.sub(prev_size as usize) }
}

/// Reads the header tag of the block at `payload`.
#[inline]
pub(crate) unsafe fn header_tag(payload: *mut u8) -> Tag {
    unsafe { read_tag(header_addr(payload)) }
}
