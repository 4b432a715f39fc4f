use std::io;
use std::num::NonZero;

use crate::FixedPool;

/// Builder for configuring and constructing a [`FixedPool`].
///
/// Both the cell count and the object size must be specified before calling
/// [`build()`][Self::build].
///
/// # Examples
///
/// ```rust
/// use std::num::NonZero;
///
/// use fixed_pool::FixedPool;
///
/// let pool = FixedPool::builder()
///     .capacity(NonZero::new(16).unwrap())
///     .object_size(96)
///     .build()?;
///
/// assert_eq!(pool.capacity().get(), 16);
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct FixedPoolBuilder {
    capacity: Option<NonZero<usize>>,
    object_size: Option<usize>,
}

impl FixedPoolBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the number of cells in the pool.
    ///
    /// The capacity is fixed for the lifetime of the pool.
    pub fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the size in bytes of each object the pool will hand out.
    ///
    /// The size is rounded up to a multiple of 16 to yield the cell stride,
    /// with a floor of 32 bytes so every cell can hold its own free-list
    /// link in the header slot.
    pub fn object_size(mut self, object_size: usize) -> Self {
        self.object_size = Some(object_size);
        self
    }

    /// Creates the pool, acquiring its backing region from the operating
    /// system.
    ///
    /// # Errors
    ///
    /// Returns the underlying OS error if the region cannot be mapped. This
    /// is the only failure; on error no resources are held.
    ///
    /// # Panics
    ///
    /// Panics if [`capacity()`][Self::capacity] or
    /// [`object_size()`][Self::object_size] was not called, or if the object
    /// size is smaller than one machine word (too small to thread the free
    /// list through).
    pub fn build(self) -> Result<FixedPool, io::Error> {
        let capacity = self
            .capacity
            .expect("a capacity must be specified before calling build()");
        let object_size = self
            .object_size
            .expect("an object size must be specified before calling build()");

        assert!(
            object_size >= size_of::<usize>(),
            "object size must be at least one machine word"
        );

        FixedPool::new_inner(capacity, object_size)
    }
}
