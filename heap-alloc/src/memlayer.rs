//! # Memory Layer
//!
//! The allocator never talks to the operating system directly. Instead it is
//! generic over a [`MemoryLayer`]: a lower component that hands out a single,
//! monotonically growable byte range, mirroring the `mem_sbrk` primitive of a
//! hosted C allocator. This keeps the allocator's boundary-tag and free-list
//! logic independent of how (or whether) an embedder ever returns memory to
//! an OS.
//!
//! A [`VecMemoryLayer`] harness implementation is provided for hosts that
//! have no `sbrk`-alike of their own — notably this crate's own test suite.

use core::ptr::NonNull;

/// Failure returned by [`MemoryLayer::request`] when no more bytes can be
/// appended to the heap.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// The layer has no more backing storage to extend into.
    #[error("memory layer exhausted")]
    Exhausted,
}

/// A lower component that owns a contiguous, append-only byte range.
///
/// Implementations must guarantee that addresses already handed out via
/// [`request`](MemoryLayer::request) remain valid and do not move for the
/// lifetime of the layer — the allocator stores raw pointers and 32-bit
/// offsets derived from them.
pub trait MemoryLayer {
    /// Appends `n` bytes at the high end of the heap and returns a pointer to
    /// the start of the new range.
    ///
    /// # Errors
    /// Returns [`LayerError::Exhausted`] if the layer cannot grow by `n`
    /// bytes. The heap state as observed by the caller is unchanged on
    /// failure.
    fn request(&mut self, n: usize) -> Result<NonNull<u8>, LayerError>;

    /// The address of the first byte ever handed out by this layer.
    fn heap_low(&self) -> *const u8;

    /// One past the address of the last byte handed out by this layer.
    fn heap_high(&self) -> *const u8;
}

#[cfg(any(test, feature = "std"))]
pub use host::VecMemoryLayer;

#[cfg(any(test, feature = "std"))]
mod host {
    use super::{LayerError, MemoryLayer};
    use core::ptr::NonNull;

    /// A [`MemoryLayer`] backed by a pre-reserved `Vec<u8>`.
    ///
    /// The vector's capacity is fixed at construction time and never grows,
    /// so pointers handed out to the allocator stay valid for the harness's
    /// entire lifetime — a real `sbrk` gives the same guarantee by reserving
    /// virtual address space up front. `request` only ever advances the
    /// committed length within that reservation.
    pub struct VecMemoryLayer {
        storage: Vec<u8>,
        capacity: usize,
    }

    impl VecMemoryLayer {
        /// Reserve `capacity` bytes of address space. No bytes are committed
        /// (handed out via `request`) until the allocator asks for them.
        #[must_use]
        pub fn with_capacity(capacity: usize) -> Self {
            Self {
                storage: Vec::with_capacity(capacity),
                capacity,
            }
        }

        /// Bytes committed so far.
        #[must_use]
        pub fn committed(&self) -> usize {
            self.storage.len()
        }
    }

    impl MemoryLayer for VecMemoryLayer {
        fn request(&mut self, n: usize) -> Result<NonNull<u8>, LayerError> {
            let start = self.storage.len();
            if start.saturating_add(n) > self.capacity {
                return Err(LayerError::Exhausted);
            }
            self.storage.resize(start + n, 0);
            // Safety: `start` is within the vector's fixed, never-reallocated
            // capacity, and the freshly resized region is initialized above.
            let ptr = unsafe { self.storage.as_mut_ptr().add(start) };
            Ok(NonNull::new(ptr).expect("vec storage pointer is never null"))
        }

        fn heap_low(&self) -> *const u8 {
            self.storage.as_ptr()
        }

        fn heap_high(&self) -> *const u8 {
            // Safety: `len()` is always within the allocation (one-past-the-end
            // is a valid pointer value even though it may not be dereferenced).
            unsafe { self.storage.as_ptr().add(self.storage.len()) }
        }
    }
}
