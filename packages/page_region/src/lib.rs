//! Page-granularity anonymous memory regions acquired directly from the
//! operating system.
//!
//! This crate provides [`PageRegion`], an owned, page-aligned, zero-initialized
//! byte range obtained from the platform's anonymous mapping facility
//! (`mmap` on unix, `VirtualAlloc` on windows), and [`fill`], an aligned bulk
//! byte-fill used by allocators to wipe their regions on reset.
//!
//! The crate exists to serve pool-style allocators that want to own their
//! backing memory outright instead of borrowing it from the global allocator.
//! A region is acquired once, carved up by the caller however it likes, and
//! returned to the operating system when the [`PageRegion`] is dropped.
//!
//! # Examples
//!
//! ```rust
//! use std::num::NonZero;
//!
//! use page_region::PageRegion;
//!
//! let region = PageRegion::acquire(NonZero::new(4096).unwrap())?;
//!
//! // Anonymous mappings start out zero-filled.
//! // SAFETY: The region is live, readable and at least 4096 bytes long.
//! let first = unsafe { region.ptr().read() };
//! assert_eq!(first, 0);
//!
//! // The mapping is released when `region` goes out of scope.
//! # Ok::<(), std::io::Error>(())
//! ```

mod fill;
mod pal;
mod region;

pub use fill::fill;
pub use region::{PageRegion, page_size};
