use std::alloc::Layout;
use std::io;
use std::num::NonZero;
use std::ptr::NonNull;
use std::slice;

use page_region::{PageRegion, fill};
use parking_lot::Mutex;

use crate::{BASE_ALIGNMENT, BlockHeader, BytePoolBuilder, FreeList, FreeListLock, HEADER_SIZE};

/// A thread-safe variable-size allocator over a growing chain of OS page
/// mappings.
///
/// Allocation tries three strategies in order: reuse a freed block from the
/// first-fit free list (splitting off any worthwhile remainder), bump-place a
/// new block in one of the existing regions, and finally grow the chain by
/// one more region sized `max(initial_region_size, size + 32)`. Freeing
/// pushes the block onto the free list and then fully coalesces it: the list
/// is sorted by address and physically adjacent blocks are merged, which
/// makes frees deliberately heavier than allocations.
///
/// Every payload is preceded by a 32-byte header; callers must not touch the
/// 32 bytes below a returned pointer and must pass back the exact pointer
/// they received. Requested sizes are rounded up to a multiple of 16 and
/// alignments below 16 are raised to 16, so every payload and every header
/// stays 16-aligned through any sequence of splits and merges.
///
/// # Examples
///
/// ```rust
/// use std::alloc::Layout;
/// use std::num::NonZero;
///
/// use byte_pool::BytePool;
///
/// let pool = BytePool::builder()
///     .initial_region_size(NonZero::new(4096).unwrap())
///     .build()?;
///
/// let layout = Layout::from_size_align(64, 16).unwrap();
/// let a = pool.allocate(layout).unwrap();
/// let b = pool.allocate(layout).unwrap();
///
/// // SAFETY: Both pointers came from this pool and are freed exactly once.
/// unsafe {
///     pool.free(a);
///     pool.free(b);
/// }
///
/// // Adjacent freed blocks merge, so a request covering both succeeds
/// // without growing the pool.
/// let merged = Layout::from_size_align(160, 16).unwrap();
/// assert!(pool.allocate(merged).is_some());
/// assert_eq!(pool.region_count(), 1);
/// # Ok::<(), std::io::Error>(())
/// ```
///
/// # Thread Safety
///
/// One coarse mutex serializes every public operation; free-list mutation
/// additionally happens under a dedicated busy-wait lock nested inside the
/// mutex. The pool is `Send + Sync`. Dropping the pool does not wait for
/// outstanding allocations; the caller must ensure no payload pointer
/// outlives the pool.
#[derive(Debug)]
pub struct BytePool {
    /// Size used whenever the chain grows, unless a single allocation needs
    /// a larger region.
    initial_region_size: NonZero<usize>,

    core: Mutex<Core>,
}

#[derive(Debug)]
struct Core {
    /// The region chain, in growth order. Bump allocation scans it in order;
    /// regions are only released when the pool is dropped.
    regions: Vec<BumpRegion>,

    free_list: FreeList,

    /// Guards free-list mutation. Always acquired while the coarse mutex is
    /// already held.
    free_list_lock: FreeListLock,
}

/// One region of the chain together with its bump cursor.
#[derive(Debug)]
struct BumpRegion {
    region: PageRegion,

    /// Offset of the first unallocated byte. Never exceeds the region
    /// length; never rewinds except on reset.
    bump: usize,
}

impl BumpRegion {
    /// Attempts to place a block of `size` payload bytes at the bump cursor,
    /// with the payload aligned to `align`.
    ///
    /// On success the cursor advances past the header, any alignment
    /// padding, and the payload, and the written header records the padding
    /// so the whole footprint is accounted for.
    fn bump_allocate(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.region.ptr();
        let base_addr = base.addr().get();

        let raw = base_addr.checked_add(self.bump)?;
        let earliest_payload = raw.checked_add(HEADER_SIZE)?;
        let payload_addr = earliest_payload.checked_next_multiple_of(align)?;
        let padding = payload_addr - earliest_payload;

        let required = HEADER_SIZE
            .checked_add(padding)?
            .checked_add(size)?;
        let new_bump = self.bump.checked_add(required)?;
        if new_bump > self.region.len() {
            return None;
        }

        self.bump = new_bump;

        // SAFETY: The bounds check above proves header and payload both lie
        // inside the region, and the offset is derived from the region's own
        // base pointer.
        let header = unsafe { base.add(payload_addr - HEADER_SIZE - base_addr) }
            .cast::<BlockHeader>();

        // SAFETY: The header slot is in bounds, 16-aligned (payload_addr is
        // a multiple of at least 16), and not yet visible to anyone else.
        unsafe {
            header.write(BlockHeader {
                payload_size: size,
                padding,
                next_free: None,
            });
        }

        Some(BlockHeader::payload_ptr(header))
    }
}

impl BytePool {
    /// Creates a builder for configuring and constructing a [`BytePool`].
    #[inline]
    pub fn builder() -> BytePoolBuilder {
        BytePoolBuilder::new()
    }

    pub(crate) fn new_inner(initial_region_size: NonZero<usize>) -> Result<Self, io::Error> {
        let region = PageRegion::acquire(initial_region_size)?;

        Ok(Self {
            initial_region_size,
            core: Mutex::new(Core {
                regions: vec![BumpRegion { region, bump: 0 }],
                free_list: FreeList::new(),
                free_list_lock: FreeListLock::new(),
            }),
        })
    }

    /// Allocates a block of `layout.size()` bytes whose address is a
    /// multiple of `layout.align()`.
    ///
    /// Returns `None` for zero-size layouts and when no strategy can supply
    /// the block: the free list holds no fitting block, no region has enough
    /// bump space, and the operating system refuses a new region. A failed
    /// call leaves the pool exactly as it was, with one exception: a grown
    /// region whose alignment-padding retry still fails (see the alignment
    /// caveat below) is kept on the chain, where later allocations can use
    /// it.
    ///
    /// The free-list walk only tests each block's payload address against
    /// the requested alignment; blocks containing a suitably aligned range
    /// deeper inside are passed over, which can leave such blocks parked on
    /// the list under alignment-heavy workloads. One more caveat applies to
    /// alignments far above the region granularity: a grown region is sized
    /// for the payload and header but not for worst-case alignment padding,
    /// so the retry inside it can still come up empty even though the
    /// region was appended.
    #[must_use]
    pub fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }

        let size = layout.size().checked_next_multiple_of(BASE_ALIGNMENT)?;
        let align = layout.align().max(BASE_ALIGNMENT);

        let mut guard = self.core.lock();
        let core = &mut *guard;

        {
            let _lock = core.free_list_lock.acquire();

            if let Some(header) = core.free_list.take_first_fit(size, align) {
                return Some(BlockHeader::payload_ptr(header));
            }
        }

        for region in &mut core.regions {
            if let Some(payload) = region.bump_allocate(size, align) {
                return Some(payload);
            }
        }

        // Acquire before appending so a refused growth leaves the chain
        // untouched.
        let grown_len = self.initial_region_size.get().max(size.checked_add(HEADER_SIZE)?);
        let region = PageRegion::acquire(
            NonZero::new(grown_len).expect("grown length has a nonzero floor"),
        )
        .ok()?;

        core.regions.push(BumpRegion { region, bump: 0 });

        let region = core.regions.last_mut().expect("a region was just appended");
        region.bump_allocate(size, align)
    }

    /// Returns the block owning `ptr` to the free list and coalesces.
    ///
    /// After the call the free list is sorted by address and contains no two
    /// physically adjacent blocks; the freed bytes become reusable by any
    /// later [`allocate()`][Self::allocate] they fit.
    ///
    /// # Safety
    ///
    /// `ptr` must be a payload pointer previously returned by
    /// [`allocate()`][Self::allocate] on this pool, not freed since, and the
    /// caller must not use it afterwards. The pool does not detect
    /// double-frees.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let mut guard = self.core.lock();
        let core = &mut *guard;

        // SAFETY: Caller guarantees `ptr` came from allocate(), so its
        // header sits HEADER_SIZE bytes below it.
        let header = unsafe { BlockHeader::from_payload(ptr) };

        let _lock = core.free_list_lock.acquire();
        core.free_list.push(header);
        core.free_list.coalesce();
    }

    /// Discards every allocation at once, keeping the grown region chain.
    ///
    /// The free list is cleared, every region's bump cursor rewinds to zero,
    /// and every region's bytes are wiped to zero. The pool then behaves
    /// like a freshly built pool, except that regions acquired through
    /// growth remain available.
    ///
    /// # Safety
    ///
    /// The caller must ensure no payload pointer returned before the reset
    /// is used afterwards; every outstanding allocation is invalidated.
    pub unsafe fn reset(&self) {
        let mut guard = self.core.lock();
        let core = &mut *guard;

        {
            let _lock = core.free_list_lock.acquire();
            core.free_list.clear();
        }

        for region in &mut core.regions {
            region.bump = 0;

            // SAFETY: The caller guarantees no outstanding payload pointers
            // are in use, so this is the only access path to the region.
            let bytes = unsafe {
                slice::from_raw_parts_mut(region.region.ptr().as_ptr(), region.region.len())
            };
            fill(bytes, 0);
        }
    }

    /// The size used whenever the pool grows, unless a single allocation
    /// forces a larger region.
    #[must_use]
    #[inline]
    pub fn initial_region_size(&self) -> NonZero<usize> {
        self.initial_region_size
    }

    /// The number of regions currently in the chain.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to report a chain that never grows.
    pub fn region_count(&self) -> usize {
        self.core.lock().regions.len()
    }

    /// The number of blocks currently on the free list.
    ///
    /// The count walks the whole list, so it also doubles as a liveness
    /// probe: it terminates in exactly one step per block.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.core.lock().free_list.count()
    }
}

// SAFETY: All mutable state sits behind the coarse mutex and the regions are
// exclusively owned by this pool, so moving the pool to another thread moves
// sole ownership with it.
unsafe impl Send for BytePool {}

// SAFETY: Every public operation serializes on the coarse mutex; the raw
// pointers stored inside never escape except as payload addresses whose
// synchronization is the caller's responsibility.
unsafe impl Sync for BytePool {}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with_region_size(len: usize) -> BytePool {
        BytePool::builder()
            .initial_region_size(NonZero::new(len).unwrap())
            .build()
            .unwrap()
    }

    fn layout(size: usize, align: usize) -> Layout {
        Layout::from_size_align(size, align).unwrap()
    }

    #[test]
    fn first_allocation_is_aligned_and_advances_the_cursor() {
        let pool = pool_with_region_size(4096);

        let ptr = pool.allocate(layout(256, 16)).unwrap();

        assert_eq!(ptr.addr().get() % 16, 0);
        // Header plus payload: the cursor moved at least 32 + 256 bytes.
        assert!(pool.core.lock().regions[0].bump >= 288);

        unsafe { pool.free(ptr) };
    }

    #[test]
    fn adjacent_frees_merge_into_one_block() {
        let pool = pool_with_region_size(4096);

        let a = pool.allocate(layout(64, 16)).unwrap();
        let b = pool.allocate(layout(64, 16)).unwrap();

        unsafe {
            pool.free(a);
            pool.free(b);
        }

        // One merged block spanning both payloads and the interior header.
        assert_eq!(pool.free_block_count(), 1);
        let head = pool.core.lock().free_list.head().unwrap();
        // SAFETY: The head of the free list has a valid header.
        assert_eq!(unsafe { head.as_ref() }.payload_size, 64 + 32 + 64);
    }

    #[test]
    fn reverse_freed_run_is_reusable_as_one_exact_fit() {
        // 100 blocks of 16 payload bytes cost 48 bytes each; an 8 KiB region
        // keeps the whole run contiguous.
        let pool = pool_with_region_size(8192);

        let ptrs: Vec<_> = (0..100)
            .map(|_| pool.allocate(layout(16, 16)).unwrap())
            .collect();

        for ptr in ptrs.iter().rev() {
            unsafe { pool.free(*ptr) };
        }

        // The whole run collapsed into a single block covering every payload
        // and every interior header.
        assert_eq!(pool.free_block_count(), 1);
        let merged_payload = 100 * 16 + 99 * 32;

        let reused = pool.allocate(layout(merged_payload, 16)).unwrap();

        // Served from the free list: same address, no growth.
        assert_eq!(reused, ptrs[0]);
        assert_eq!(pool.region_count(), 1);
        assert_eq!(pool.free_block_count(), 0);

        unsafe { pool.free(reused) };
    }

    #[test]
    fn oversized_allocation_grows_the_chain_by_one_fitted_region() {
        let pool = pool_with_region_size(4096);

        let ptr = pool.allocate(layout(5000, 16)).unwrap();

        assert_eq!(ptr.addr().get() % 16, 0);
        assert_eq!(pool.region_count(), 2);
        {
            let core = pool.core.lock();
            // The grown region fits the payload and its header.
            assert!(core.regions[1].region.len() >= 5000 + 32);
            // The first region was left for future small allocations.
            assert_eq!(core.regions[0].bump, 0);
        }

        unsafe { pool.free(ptr) };
    }

    #[test]
    fn free_list_hit_splits_off_the_remainder() {
        let pool = pool_with_region_size(4096);

        let big = pool.allocate(layout(256, 16)).unwrap();
        unsafe { pool.free(big) };

        let small = pool.allocate(layout(64, 16)).unwrap();

        // First fit reuses the freed block's payload address and parks the
        // remainder (256 - 64 - 32 bytes) back on the list.
        assert_eq!(small, big);
        assert_eq!(pool.free_block_count(), 1);
        let head = pool.core.lock().free_list.head().unwrap();
        // SAFETY: The head of the free list has a valid header.
        assert_eq!(unsafe { head.as_ref() }.payload_size, 160);

        unsafe { pool.free(small) };
    }

    #[test]
    fn free_list_hit_without_worthwhile_remainder_is_not_split() {
        let pool = pool_with_region_size(4096);

        let block = pool.allocate(layout(64, 16)).unwrap();
        unsafe { pool.free(block) };

        // 64 < 48 + 32 + 16: splitting would leave an untrackable sliver,
        // so the whole 64-byte block is handed back out.
        let reused = pool.allocate(layout(48, 16)).unwrap();

        assert_eq!(reused, block);
        assert_eq!(pool.free_block_count(), 0);

        unsafe { pool.free(reused) };
    }

    #[test]
    fn misaligned_free_block_is_skipped_not_subdivided() {
        let pool = pool_with_region_size(4096);

        let first = pool.allocate(layout(64, 16)).unwrap();
        unsafe { pool.free(first) };

        // The freed payload sits 32 bytes into the page-aligned region, so
        // it cannot satisfy 64-byte alignment even though an aligned range
        // exists inside it; the request must fall through to bump space.
        assert_eq!(first.addr().get() % 64, 32);
        let aligned = pool.allocate(layout(64, 64)).unwrap();

        assert_ne!(aligned, first);
        assert_eq!(aligned.addr().get() % 64, 0);
        assert_eq!(pool.free_block_count(), 1);

        unsafe { pool.free(aligned) };
    }

    #[test]
    fn large_alignment_is_honored_with_padding() {
        let pool = pool_with_region_size(4096);

        // Push the cursor off the page boundary first.
        let filler = pool.allocate(layout(16, 16)).unwrap();

        let ptr = pool.allocate(layout(16, 256)).unwrap();
        assert_eq!(ptr.addr().get() % 256, 0);

        // The header in front of the payload recorded the padding that the
        // alignment forced in.
        // SAFETY: `ptr` is a live payload of this pool.
        let header = unsafe { BlockHeader::from_payload(ptr) };
        // SAFETY: Live block headers are valid for reads.
        assert!(unsafe { header.as_ref() }.padding > 0);

        unsafe {
            pool.free(filler);
            pool.free(ptr);
        }
    }

    #[test]
    fn zero_size_layout_is_refused() {
        let pool = pool_with_region_size(4096);

        assert_eq!(pool.allocate(layout(0, 1)), None);
        assert_eq!(pool.region_count(), 1);
        assert_eq!(pool.core.lock().regions[0].bump, 0);
    }

    #[test]
    fn refused_growth_leaves_the_pool_usable() {
        let pool = pool_with_region_size(4096);

        // Far beyond anything the OS will map. The refusal happens before
        // anything is appended, so this failure mode is atomic.
        assert_eq!(pool.allocate(layout(usize::MAX / 4, 16)), None);
        assert_eq!(pool.region_count(), 1);

        // Ordinary allocation still works.
        let ptr = pool.allocate(layout(64, 16)).unwrap();
        unsafe { pool.free(ptr) };
    }

    #[test]
    fn grown_region_is_kept_when_alignment_retry_fails() {
        let pool = pool_with_region_size(4096);

        // The grown region is sized for payload and header only, so an
        // alignment far beyond the region granularity makes the retry bump
        // fail inside it: mapping bases are page-aligned, which puts the
        // earliest payload 32 bytes past a page boundary and forces almost
        // a megabyte of padding into a 4096-byte region.
        assert_eq!(pool.allocate(layout(64, 1 << 20)), None);

        // The region was appended anyway; this is the one non-atomic
        // failure mode.
        assert_eq!(pool.region_count(), 2);
        {
            let core = pool.core.lock();
            assert!(core.regions.iter().all(|region| region.bump == 0));
        }

        // Later allocations can still use the appended region.
        let a = pool.allocate(layout(64, 16)).unwrap();
        let b = pool.allocate(layout(4000, 16)).unwrap();
        assert_eq!(pool.region_count(), 2);

        unsafe {
            pool.free(a);
            pool.free(b);
        }
    }

    #[test]
    fn reset_keeps_grown_regions_and_zeroes_memory() {
        let pool = pool_with_region_size(4096);

        // Grow to two regions and leave blocks both live and freed.
        let big = pool.allocate(layout(5000, 16)).unwrap();
        let small = pool.allocate(layout(64, 16)).unwrap();
        unsafe { pool.free(big) };
        assert_eq!(pool.region_count(), 2);

        // SAFETY: `small` is discarded along with everything else and never
        // used after this point.
        unsafe { pool.reset() };

        assert_eq!(pool.region_count(), 2);
        assert_eq!(pool.free_block_count(), 0);
        {
            let core = pool.core.lock();
            assert!(core.regions.iter().all(|region| region.bump == 0));
        }

        // Fresh allocations start from the front of the chain again and
        // read as zero.
        let fresh = pool.allocate(layout(64, 16)).unwrap();
        assert_eq!(fresh, small);
        for offset in 0..64 {
            // SAFETY: offset < payload size, inside our block.
            assert_eq!(unsafe { fresh.add(offset).read() }, 0);
        }

        unsafe { pool.free(fresh) };
    }

    #[test]
    fn same_size_round_trip_stays_in_one_region() {
        let pool = pool_with_region_size(4096);

        for _ in 0..10_000 {
            let ptr = pool.allocate(layout(128, 16)).unwrap();
            // SAFETY: Fresh allocation, exclusively ours.
            unsafe { ptr.write(0xA5) };
            // SAFETY: Freed exactly once, not used again.
            unsafe { pool.free(ptr) };
        }

        assert_eq!(pool.region_count(), 1);
    }

    #[test]
    fn requested_sizes_are_rounded_to_the_base_alignment() {
        let pool = pool_with_region_size(4096);

        let ptr = pool.allocate(layout(3, 1)).unwrap();

        // SAFETY: `ptr` is a live payload of this pool.
        let header = unsafe { BlockHeader::from_payload(ptr) };
        // SAFETY: Live block headers are valid for reads.
        assert_eq!(unsafe { header.as_ref() }.payload_size, 16);
        assert_eq!(ptr.addr().get() % 16, 0);

        unsafe { pool.free(ptr) };
    }
}
