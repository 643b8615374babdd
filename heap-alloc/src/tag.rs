//! # Block Tag Codec
//!
//! Packs `(size, prev_alloc, alloc)` into the 4-byte header/footer word.
//!
//! `size` is always a multiple of 8 (see [`crate::ALIGNMENT`]), so its three
//! low bits are free. `alloc` takes bit 0, `prev_alloc` takes bit 1, and bit
//! 2 is reserved (always zero) rather than reused, keeping the size field a
//! clean, contiguous 29 bits instead of the three-way OR the original C
//! source performs by hand.

use bitfield_struct::bitfield;

/// The 4-byte header/footer word.
///
/// Free blocks carry this word twice (header and footer); allocated blocks
/// carry it once (header only) — see the crate-level docs for the
/// block-format rules that follow from that asymmetry.
#[bitfield(u32)]
pub(crate) struct Tag {
    /// This block is allocated.
    pub alloc: bool,
    /// The immediately preceding adjacent block is allocated.
    pub prev_alloc: bool,
    #[bits(1)]
    _reserved: u8,
    /// `size >> 3`: the block's total byte size, including metadata, divided
    /// by the mandatory 8-byte alignment.
    #[bits(29)]
    size_over_8: u32,
}

impl Tag {
    /// Build a tag from a byte size already known to be a multiple of 8.
    ///
    /// # Panics
    /// In debug builds, if `size` is not a multiple of [`crate::ALIGNMENT`].
    pub(crate) const fn pack(size: u32, prev_alloc: bool, alloc: bool) -> Self {
        debug_assert!(size % crate::ALIGNMENT as u32 == 0);
        Tag::new()
            .with_size_over_8(size >> 3)
            .with_prev_alloc(prev_alloc)
            .with_alloc(alloc)
    }

    /// The block's total byte size, including metadata.
    pub(crate) const fn size(self) -> u32 {
        self.size_over_8() << 3
    }

    /// Returns the same tag with `size` replaced, flags unchanged.
    pub(crate) const fn with_resized(self, size: u32) -> Self {
        debug_assert!(size % crate::ALIGNMENT as u32 == 0);
        self.with_size_over_8(size >> 3)
    }
}

/// Reads the tag word at `addr`.
///
/// # Safety
/// `addr` must be valid for a 4-byte read and properly aligned.
#[inline]
pub(crate) unsafe fn read_tag(addr: *const u8) -> Tag {
    let bits = unsafe { addr.cast::<u32>().read_unaligned() };
    Tag::from_bits(bits)
}

/// Writes `tag` at `addr`.
///
/// # Safety
/// `addr` must be valid for a 4-byte write and properly aligned.
#[inline]
pub(crate) unsafe fn write_tag(addr: *mut u8, tag: Tag) {
    unsafe { addr.cast::<u32>().write_unaligned(tag.into_bits()) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_roundtrips_size_and_flags() {
        let t = Tag::pack(48, true, false);
        assert_eq!(t.size(), 48);
        assert!(t.prev_alloc());
        assert!(!t.alloc());
    }

    #[test]
    fn with_resized_preserves_flags() {
        let t = Tag::pack(16, false, true).with_resized(64);
        assert_eq!(t.size(), 64);
        assert!(!t.prev_alloc());
        assert!(t.alloc());
    }

    #[test]
    fn read_write_tag_roundtrip() {
        let mut buf = [0u8; 4];
        let t = Tag::pack(4096, true, true);
        unsafe {
            write_tag(buf.as_mut_ptr(), t);
            let back = read_tag(buf.as_ptr());
            assert_eq!(back.size(), 4096);
            assert!(back.alloc());
            assert!(back.prev_alloc());
        }
    }
}
