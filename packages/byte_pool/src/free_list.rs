use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{hint, process, thread};

use crate::{BlockHeader, HEADER_SIZE, MIN_SPLIT};

/// How many failed acquisition attempts the free-list lock tolerates before
/// concluding that the locking protocol is corrupted.
const SPIN_LIMIT: usize = 1_000_000;

/// Busy-wait lock serializing free-list mutation.
///
/// The lock is always acquired while the pool's coarse mutex is already
/// held, so in the current design it never contends; it exists to keep the
/// free list's serialization independent of the mutex discipline around it.
/// The bounded spin count is a deadlock backstop, not a fairness mechanism:
/// a lock held across a million yields means a hole in the locking protocol,
/// and the process aborts rather than continue with a corrupt free list.
#[derive(Debug)]
pub(crate) struct FreeListLock {
    locked: AtomicBool,
}

impl FreeListLock {
    pub(crate) const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Spins until the lock is held, yielding between attempts.
    ///
    /// Aborts the process if the spin limit is exhausted.
    #[must_use]
    pub(crate) fn acquire(&self) -> FreeListLockGuard<'_> {
        for _ in 0..SPIN_LIMIT {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return FreeListLockGuard { lock: self };
            }

            hint::spin_loop();
            thread::yield_now();
        }

        process::abort();
    }
}

/// Releases the [`FreeListLock`] when dropped.
#[derive(Debug)]
#[must_use]
pub(crate) struct FreeListLockGuard<'a> {
    lock: &'a FreeListLock,
}

impl Drop for FreeListLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// The chain of freed blocks, linked through their headers.
///
/// The list owns no memory; it only threads links through headers that live
/// inside the pool's regions. Callers hold the pool's [`FreeListLock`]
/// across every call that touches the chain.
///
/// Invariants maintained across the public (crate) surface:
///
/// - no cycles and no duplicate addresses;
/// - after [`coalesce()`][Self::coalesce], the chain is sorted by ascending
///   address and no two blocks are physically adjacent.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    head: Option<NonNull<BlockHeader>>,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None }
    }

    /// Pushes a retired block onto the front of the chain.
    pub(crate) fn push(&mut self, mut header: NonNull<BlockHeader>) {
        // SAFETY: The block is being retired; the free list owns its header
        // from here on.
        unsafe { header.as_mut() }.next_free = self.head;

        self.head = Some(header);
    }

    /// Unlinks and returns the first block whose payload address is already
    /// aligned to `align` and whose payload holds at least `size` bytes.
    ///
    /// A block whose payload is misaligned is skipped even if an aligned
    /// range exists further inside it; the walk only ever tests the payload
    /// address itself. When the accepted block is large enough to leave a
    /// worthwhile remainder (`HEADER_SIZE + MIN_SPLIT` beyond the request),
    /// it is split and the remainder is pushed back onto the chain.
    pub(crate) fn take_first_fit(
        &mut self,
        size: usize,
        align: usize,
    ) -> Option<NonNull<BlockHeader>> {
        let mut prev: Option<NonNull<BlockHeader>> = None;
        let mut current = self.head;

        while let Some(header) = current {
            // SAFETY: Blocks on the chain have valid headers.
            let block = unsafe { header.as_ref() };
            let payload = BlockHeader::payload_ptr(header);

            if payload.addr().get() % align == 0 && block.payload_size >= size {
                match prev {
                    None => self.head = block.next_free,
                    // SAFETY: `prev` is the block we visited just before
                    // `header`; its header is valid and ours to relink.
                    Some(mut prev) => unsafe { prev.as_mut() }.next_free = block.next_free,
                }

                self.split(header, size);

                return Some(header);
            }

            prev = current;
            current = block.next_free;
        }

        None
    }

    /// Shrinks `header` to `size` payload bytes and pushes the remainder
    /// onto the chain, if the remainder is worth tracking.
    fn split(&mut self, header: NonNull<BlockHeader>, size: usize) {
        // SAFETY: The block was just unlinked; we are its only user.
        let original = unsafe { header.as_ref() }.payload_size;

        if original < size + HEADER_SIZE + MIN_SPLIT {
            return;
        }

        // SAFETY: As above; shrinking the payload cannot invalidate anything.
        unsafe { (*header.as_ptr()).payload_size = size };

        // SAFETY: The remainder slot starts inside the original payload
        // (original >= size + HEADER_SIZE), so the offset stays in bounds.
        let remainder = unsafe { header.cast::<u8>().add(HEADER_SIZE + size) }.cast::<BlockHeader>();

        // SAFETY: The remainder slot is HEADER_SIZE bytes of memory we just
        // carved off the shrunk block; nothing else references it.
        unsafe {
            remainder.write(BlockHeader {
                payload_size: original - size - HEADER_SIZE,
                padding: 0,
                next_free: self.head,
            });
        }

        self.head = Some(remainder);
    }

    /// Merges every pair of physically adjacent free blocks and leaves the
    /// chain sorted by ascending address.
    ///
    /// Runs after every free: the chain is materialized into a vector,
    /// sorted, folded so that each block absorbs any immediately following
    /// block it touches, and relinked from the survivors.
    pub(crate) fn coalesce(&mut self) {
        let count = self.count();
        if count == 0 {
            return;
        }

        let mut headers = Vec::with_capacity(count);
        let mut current = self.head;
        while let Some(header) = current {
            headers.push(header);
            // SAFETY: Blocks on the chain have valid headers.
            current = unsafe { header.as_ref() }.next_free;
        }

        headers.sort_unstable_by_key(|header| header.addr());

        // Fold each block into the previous survivor when they touch, so a
        // run of any length collapses into its lowest-addressed member.
        let mut survivors: Vec<NonNull<BlockHeader>> = Vec::with_capacity(headers.len());
        for header in headers {
            if let Some(&last) = survivors.last() {
                if BlockHeader::end_addr(last) == header.addr().get() {
                    // SAFETY: Both headers are valid free blocks; the
                    // absorbed one stops existing as a block entirely.
                    let absorbed = HEADER_SIZE + unsafe { header.as_ref() }.payload_size;

                    // SAFETY: The survivor is exclusively ours under the
                    // free-list lock.
                    unsafe { (*last.as_ptr()).payload_size += absorbed };

                    continue;
                }
            }

            survivors.push(header);
        }

        let mut next: Option<NonNull<BlockHeader>> = None;
        for &header in survivors.iter().rev() {
            // SAFETY: Survivor headers are valid and exclusively ours under
            // the free-list lock.
            unsafe { (*header.as_ptr()).next_free = next };

            next = Some(header);
        }
        self.head = next;
    }

    /// Forgets every block on the chain without touching their memory.
    pub(crate) fn clear(&mut self) {
        self.head = None;
    }

    /// The number of blocks on the chain.
    pub(crate) fn count(&self) -> usize {
        let mut count = 0;
        let mut current = self.head;

        while let Some(header) = current {
            count += 1;
            // SAFETY: Blocks on the chain have valid headers.
            current = unsafe { header.as_ref() }.next_free;
        }

        count
    }

    #[cfg(test)]
    pub(crate) fn head(&self) -> Option<NonNull<BlockHeader>> {
        self.head
    }
}
