//! A thread-safe variable-size allocator over a growing chain of OS page
//! mappings.
//!
//! This crate provides [`BytePool`], which hands out raw byte blocks of any
//! size and power-of-two alignment. New blocks come from a bump cursor inside
//! the current chain of [`page_region::PageRegion`] mappings; freed blocks go
//! onto a first-fit free list that is split on allocation and fully coalesced
//! (sorted by address, physically adjacent neighbors merged) after every
//! free. When neither the free list nor the bump space can satisfy a request,
//! the pool grows by acquiring one more region.
//!
//! Every block is preceded by a fixed 32-byte header carrying its payload
//! size, its alignment padding, and (while the block is free) the link to
//! the next free block. The pointer handed to the caller is `header + 32`.
//!
//! # Key Features
//!
//! - **Bump-fast allocation**: the common path is one cursor advance and one
//!   header write
//! - **First-fit reuse with splitting**: freed blocks are reused when their
//!   payload address matches the requested alignment, splitting off the
//!   remainder when worthwhile
//! - **Full coalescing**: after every free, physically adjacent free blocks
//!   are merged and the free list is left sorted by address
//! - **Dynamic growth**: the region chain grows on demand and is only
//!   released when the pool is dropped
//! - **Bulk reset**: [`reset()`][BytePool::reset] discards every allocation
//!   at once while keeping the grown chain
//! - **Thread safety**: one coarse mutex serializes every operation, with a
//!   dedicated busy-wait lock around free-list mutation
//!
//! # Examples
//!
//! ```rust
//! use std::alloc::Layout;
//!
//! use byte_pool::BytePool;
//!
//! let pool = BytePool::builder().build()?;
//!
//! let layout = Layout::from_size_align(256, 16).unwrap();
//! let ptr = pool.allocate(layout).expect("fresh pool has bump space");
//! assert_eq!(ptr.addr().get() % 16, 0);
//!
//! // The block is ours until freed.
//! // SAFETY: `ptr` is valid for 256 bytes and exclusively ours.
//! unsafe { ptr.write(0x2A) };
//!
//! // SAFETY: `ptr` came from this pool and is freed exactly once.
//! unsafe { pool.free(ptr) };
//! # Ok::<(), std::io::Error>(())
//! ```

mod block;
mod builder;
mod free_list;
mod pool;

pub(crate) use block::*;
pub use builder::BytePoolBuilder;
pub(crate) use free_list::*;
pub use pool::BytePool;
