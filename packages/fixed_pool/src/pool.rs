use std::io;
use std::num::NonZero;
use std::ptr::NonNull;
use std::slice;

use page_region::{PageRegion, fill};
use parking_lot::Mutex;
use static_assertions::{const_assert, const_assert_eq};

use crate::FixedPoolBuilder;

/// Reserved space at the beginning of each cell. While a cell is free, its
/// first word holds the link to the next free cell; the user payload always
/// begins this many bytes into the cell.
const HEADER_SIZE: usize = 32;

/// Every payload address is aligned to at least this many bytes.
const PAYLOAD_ALIGNMENT: usize = 16;

const_assert!(HEADER_SIZE >= size_of::<Option<NonNull<u8>>>());
const_assert_eq!(HEADER_SIZE % PAYLOAD_ALIGNMENT, 0);

/// A thread-safe pool of fixed-size memory cells carved out of one OS page
/// mapping.
///
/// The pool acquires a single contiguous region of `cell_size × capacity`
/// bytes at construction and never grows. Free cells form an intrusive
/// singly-linked list threaded through the first word of each cell, so
/// [`allocate()`][Self::allocate] and [`free()`][Self::free] are a pointer
/// pop and push under the pool's mutex.
///
/// Each cell reserves its first 32 bytes as a header slot; the pointer
/// returned by `allocate()` is `cell + 32` and the usable payload is
/// [`payload_size()`][Self::payload_size] bytes. Payload pointers are always
/// aligned to at least 16 bytes.
///
/// # Examples
///
/// ```rust
/// use std::num::NonZero;
///
/// use fixed_pool::FixedPool;
///
/// let pool = FixedPool::builder()
///     .capacity(NonZero::new(3).unwrap())
///     .object_size(64)
///     .build()?;
///
/// // A pool of capacity 3 yields exactly 3 cells.
/// let a = pool.allocate().unwrap();
/// let b = pool.allocate().unwrap();
/// let c = pool.allocate().unwrap();
/// assert_eq!(pool.allocate(), None);
///
/// // Returning any cell makes exactly one more allocation possible.
/// // SAFETY: `b` came from this pool and is freed exactly once.
/// unsafe { pool.free(b) };
/// assert!(pool.allocate().is_some());
///
/// # unsafe { pool.free(a) };
/// # unsafe { pool.free(c) };
/// # Ok::<(), std::io::Error>(())
/// ```
///
/// # Thread Safety
///
/// Every public operation acquires the pool's internal mutex, so operations
/// are totally ordered and the pool is `Send + Sync`. Dropping the pool does
/// not wait for outstanding allocations; the caller must ensure no payload
/// pointer outlives the pool.
#[derive(Debug)]
pub struct FixedPool {
    /// Stride between cells; `object_size` rounded up to a multiple of 16,
    /// with a floor of `HEADER_SIZE`.
    cell_size: usize,

    /// Number of cells, fixed at construction.
    capacity: NonZero<usize>,

    core: Mutex<Core>,
}

#[derive(Debug)]
struct Core {
    /// The backing mapping; exactly `cell_size × capacity` bytes.
    region: PageRegion,

    /// First free cell, or `None` when the pool is exhausted.
    free_head: Option<NonNull<u8>>,

    /// Number of cells currently handed out.
    in_use: usize,
}

impl FixedPool {
    /// Creates a builder for configuring and constructing a [`FixedPool`].
    ///
    /// You must specify the cell count via `.capacity()` and the object size
    /// via `.object_size()` before calling `.build()`.
    #[inline]
    pub fn builder() -> FixedPoolBuilder {
        FixedPoolBuilder::new()
    }

    pub(crate) fn new_inner(
        capacity: NonZero<usize>,
        object_size: usize,
    ) -> Result<Self, io::Error> {
        let cell_size = object_size
            .checked_next_multiple_of(PAYLOAD_ALIGNMENT)
            .expect("object size rounds up beyond usize::MAX")
            .max(HEADER_SIZE);

        let region_len = cell_size
            .checked_mul(capacity.get())
            .and_then(NonZero::new)
            .expect("cell size × capacity overflows usize");

        let region = PageRegion::acquire(region_len)?;

        let mut core = Core {
            region,
            free_head: None,
            in_use: 0,
        };
        core.rebuild_free_list(cell_size, capacity.get());

        Ok(Self {
            cell_size,
            capacity,
            core: Mutex::new(core),
        })
    }

    /// Pops one cell off the free list and returns its payload address.
    ///
    /// Returns `None` when every cell is handed out. The payload is valid
    /// for [`payload_size()`][Self::payload_size] bytes, aligned to at least
    /// 16, and reads as zero the first time a cell is handed out after
    /// construction or [`reset()`][Self::reset].
    #[must_use]
    pub fn allocate(&self) -> Option<NonNull<u8>> {
        let mut core = self.core.lock();

        let cell = core.free_head?;

        // SAFETY: A cell on the free list stores the link to the next free
        // cell in its first word; nothing else may touch a free cell.
        let next = unsafe { cell.cast::<Option<NonNull<u8>>>().read() };

        core.free_head = next;
        core.in_use += 1;

        // SAFETY: cell_size >= HEADER_SIZE, so the payload address is within
        // the cell or exactly one past the final cell's start, both inside
        // the allocated object for pointer arithmetic purposes.
        Some(unsafe { cell.add(HEADER_SIZE) })
    }

    /// Pushes the cell owning `ptr` back onto the free list.
    ///
    /// # Safety
    ///
    /// `ptr` must be a payload pointer previously returned by
    /// [`allocate()`][Self::allocate] on this pool, not freed since, and the
    /// caller must not use it afterwards. The pool does not detect
    /// double-frees.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let mut core = self.core.lock();

        // SAFETY: allocate() returned `cell + HEADER_SIZE`, so stepping back
        // lands on the cell boundary inside the region.
        let cell = unsafe { ptr.sub(HEADER_SIZE) };

        debug_assert_eq!(
            (cell.addr().get() - core.region.ptr().addr().get()) % self.cell_size,
            0,
            "freed pointer does not sit on a cell boundary of this pool"
        );

        // SAFETY: The cell is being retired; its first word becomes the free
        // list link again.
        unsafe { cell.cast::<Option<NonNull<u8>>>().write(core.free_head) };

        core.free_head = Some(cell);
        core.in_use -= 1;
    }

    /// Returns every cell to the free list and zeroes the entire region.
    ///
    /// Afterwards the pool is observably identical to a freshly built pool
    /// with the same configuration: the free list is threaded in ascending
    /// cell order and every payload byte reads as zero.
    ///
    /// # Safety
    ///
    /// The caller must ensure no payload pointer returned before the reset
    /// is used afterwards; every outstanding allocation is invalidated.
    pub unsafe fn reset(&self) {
        let mut core = self.core.lock();

        let region_ptr = core.region.ptr();
        let region_len = core.region.len();

        // Wipe first: the wipe covers the link words, so the free list is
        // rebuilt after it.
        //
        // SAFETY: The caller guarantees no outstanding payload pointers are
        // in use, so this is the only access path to the region right now.
        let bytes = unsafe { slice::from_raw_parts_mut(region_ptr.as_ptr(), region_len) };
        fill(bytes, 0);

        core.rebuild_free_list(self.cell_size, self.capacity.get());
    }

    /// The number of cells in the pool, fixed at construction.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// The stride between cells: the configured object size rounded up to a
    /// multiple of 16, with a floor of 32.
    #[must_use]
    #[inline]
    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    /// The usable bytes behind each payload pointer: `cell_size() - 32`.
    #[must_use]
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.cell_size - HEADER_SIZE
    }

    /// The number of cells currently handed out.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to report a pool that never drains.
    pub fn len(&self) -> usize {
        self.core.lock().in_use
    }

    /// Returns `true` if no cells are currently handed out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Core {
    /// Threads every cell onto the free list in ascending address order,
    /// with the final cell terminating the chain.
    fn rebuild_free_list(&mut self, cell_size: usize, capacity: usize) {
        let base = self.region.ptr();

        for index in 0..capacity {
            // SAFETY: index < capacity, so the cell starts inside the region.
            let cell = unsafe { base.add(index * cell_size) };

            let next = if index + 1 < capacity {
                // SAFETY: The following cell also starts inside the region.
                Some(unsafe { base.add((index + 1) * cell_size) })
            } else {
                None
            };

            // SAFETY: Every cell is at least HEADER_SIZE bytes, enough for
            // the link word, and no cell is handed out while we rebuild.
            unsafe { cell.cast::<Option<NonNull<u8>>>().write(next) };
        }

        self.free_head = Some(base);
        self.in_use = 0;
    }
}

// SAFETY: All mutable state sits behind the mutex and the backing region is
// exclusively owned by this pool, so moving the pool to another thread moves
// sole ownership with it.
unsafe impl Send for FixedPool {}

// SAFETY: Every public operation serializes on the internal mutex; the raw
// pointers stored inside never escape except as payload addresses whose
// synchronization is the caller's responsibility.
unsafe impl Sync for FixedPool {}
