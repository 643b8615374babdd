//! Integration tests driving the public `HeapAllocator` API end to end
//! against the `VecMemoryLayer` harness, covering the scenarios and
//! properties from the block-design notes.

use heap_alloc::{HeapAllocator, VecMemoryLayer};

fn harness(capacity: usize) -> HeapAllocator<VecMemoryLayer> {
    HeapAllocator::new(VecMemoryLayer::with_capacity(capacity))
        .expect("harness capacity is ample for these tests")
}

#[test]
fn alloc_returns_aligned_non_overlapping_blocks() {
    let mut a = harness(1 << 20);
    let p1 = a.alloc(24).unwrap();
    let p2 = a.alloc(40).unwrap();
    let p3 = a.alloc(8).unwrap();

    assert_eq!(p1.as_ptr() as usize % 8, 0);
    assert_eq!(p2.as_ptr() as usize % 8, 0);
    assert_eq!(p3.as_ptr() as usize % 8, 0);
    assert_ne!(p1, p2);
    assert_ne!(p2, p3);
    assert_ne!(p1, p3);
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn alloc_zero_is_a_no_op() {
    let mut a = harness(1 << 16);
    assert!(a.alloc(0).is_none());
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn free_then_alloc_same_size_reuses_the_block() {
    let mut a = harness(1 << 20);
    let p1 = a.alloc(64).unwrap();
    let addr = p1.as_ptr();
    a.free(Some(p1));
    assert!(a.check_heap(false).is_ok());

    let p2 = a.alloc(64).unwrap();
    assert_eq!(p2.as_ptr(), addr);
}

#[test]
fn freeing_adjacent_blocks_coalesces_them() {
    let mut a = harness(1 << 20);
    let p1 = a.alloc(64).unwrap();
    let p2 = a.alloc(64).unwrap();
    let p3 = a.alloc(64).unwrap();

    a.free(Some(p1));
    a.free(Some(p2));
    assert!(a.check_heap(false).is_ok());

    // The coalesced free region left by p1+p2 must be large enough to serve
    // a request that neither block could satisfy alone.
    let big = a.alloc(64 + 64 + 8).unwrap();
    assert_eq!(big.as_ptr(), p1.as_ptr());
    assert!(a.check_heap(false).is_ok());

    a.free(Some(p3));
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn free_none_is_a_no_op() {
    let mut a = harness(1 << 16);
    a.free(None);
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn resize_growing_preserves_prefix_bytes() {
    let mut a = harness(1 << 20);
    let p = a.alloc(16).unwrap();
    unsafe {
        core::ptr::write_bytes(p.as_ptr(), 0xAB, 16);
    }

    let grown = a.resize(Some(p), 256).unwrap();
    let bytes = unsafe { core::slice::from_raw_parts(grown.as_ptr(), 16) };
    assert!(bytes.iter().all(|&b| b == 0xAB));
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn resize_shrinking_keeps_the_same_pointer() {
    let mut a = harness(1 << 20);
    let p = a.alloc(256).unwrap();
    let shrunk = a.resize(Some(p), 16).unwrap();
    assert_eq!(shrunk.as_ptr(), p.as_ptr());
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn resize_with_none_pointer_behaves_as_alloc() {
    let mut a = harness(1 << 16);
    let p = a.resize(None, 32);
    assert!(p.is_some());
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn resize_to_zero_frees_and_returns_none() {
    let mut a = harness(1 << 16);
    let p = a.alloc(32).unwrap();
    let result = a.resize(Some(p), 0);
    assert!(result.is_none());
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn zeroed_alloc_zeroes_the_whole_payload() {
    let mut a = harness(1 << 20);
    let p = a.alloc(64).unwrap();
    unsafe { core::ptr::write_bytes(p.as_ptr(), 0xFF, 64) };
    a.free(Some(p));

    let z = a.zeroed_alloc(8, 8).unwrap();
    let bytes = unsafe { core::slice::from_raw_parts(z.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn zeroed_alloc_overflowing_count_times_size_fails_safely() {
    let mut a = harness(1 << 16);
    assert!(a.zeroed_alloc(usize::MAX, 2).is_none());
}

#[test]
fn many_interleaved_alloc_and_free_stays_consistent() {
    let mut a = harness(4 << 20);
    let mut live = Vec::new();

    for round in 0..200 {
        let size = 8 + (round * 37) % 500;
        if let Some(p) = a.alloc(size) {
            live.push(p);
        }
        if round % 3 == 0 {
            if let Some(p) = live.pop() {
                a.free(Some(p));
            }
        }
        assert!(a.check_heap(false).is_ok(), "inconsistent after round {round}");
    }

    for p in live {
        a.free(Some(p));
    }
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn heap_extends_when_no_free_block_fits() {
    let mut a = harness(16 << 20);
    let mut ptrs = Vec::new();
    for _ in 0..4096 {
        ptrs.push(a.alloc(256).unwrap());
    }
    assert!(a.check_heap(false).is_ok());
    for p in ptrs {
        a.free(Some(p));
    }
    assert!(a.check_heap(false).is_ok());
}

#[test]
fn exhausted_layer_fails_allocation_without_corrupting_the_heap() {
    let mut a = harness(8192);
    let mut last_ok = None;
    loop {
        match a.alloc(4096) {
            Some(p) => last_ok = Some(p),
            None => break,
        }
    }
    assert!(last_ok.is_some());
    assert!(a.check_heap(false).is_ok());
}
