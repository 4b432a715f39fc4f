use std::io;
use std::num::NonZero;

use new_zealand::nz;

use crate::BytePool;

/// Size of the first region, and of every later region that is not forced
/// larger by a single oversized allocation.
///
/// 64 KiB keeps small pools to one mapping while amortizing growth for
/// mixed workloads; callers with known footprints override it.
pub(crate) const DEFAULT_INITIAL_REGION_SIZE: NonZero<usize> = nz!(65_536);

/// Builder for configuring and constructing a [`BytePool`].
///
/// # Examples
///
/// ```rust
/// use std::num::NonZero;
///
/// use byte_pool::BytePool;
///
/// // The default region size suits most workloads...
/// let pool = BytePool::builder().build()?;
///
/// // ...or pick the growth granularity yourself.
/// let pool = BytePool::builder()
///     .initial_region_size(NonZero::new(4096).unwrap())
///     .build()?;
///
/// assert_eq!(pool.initial_region_size().get(), 4096);
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct BytePoolBuilder {
    initial_region_size: Option<NonZero<usize>>,
}

impl BytePoolBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the size in bytes of the pool's first region.
    ///
    /// The same size is used whenever the pool grows, unless a single
    /// allocation needs more, in which case that one region is sized to fit
    /// it.
    pub fn initial_region_size(mut self, initial_region_size: NonZero<usize>) -> Self {
        self.initial_region_size = Some(initial_region_size);
        self
    }

    /// Creates the pool, acquiring its first region from the operating
    /// system.
    ///
    /// # Errors
    ///
    /// Returns the underlying OS error if the region cannot be mapped. This
    /// is the only failure; on error no resources are held.
    pub fn build(self) -> Result<BytePool, io::Error> {
        let initial_region_size = self
            .initial_region_size
            .unwrap_or(DEFAULT_INITIAL_REGION_SIZE);

        BytePool::new_inner(initial_region_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_region_size_applies() {
        let pool = BytePoolBuilder::new().build().unwrap();

        assert_eq!(pool.initial_region_size(), DEFAULT_INITIAL_REGION_SIZE);
        assert_eq!(pool.region_count(), 1);
    }

    #[test]
    fn explicit_region_size_applies() {
        let pool = BytePoolBuilder::new()
            .initial_region_size(nz!(4096))
            .build()
            .unwrap();

        assert_eq!(pool.initial_region_size(), nz!(4096));
    }

    #[test]
    fn impossible_region_reports_os_error() {
        let result = BytePoolBuilder::new()
            .initial_region_size(NonZero::new(usize::MAX / 2).unwrap())
            .build();

        assert!(result.is_err());
    }
}
