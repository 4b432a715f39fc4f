//! A thread-safe fixed-size object allocator backed by a single OS page
//! mapping.
//!
//! This crate provides [`FixedPool`], a pool of equally sized memory cells
//! carved out of one contiguous [`page_region::PageRegion`]. Free cells are
//! threaded through an intrusive free list stored inside the cells
//! themselves, so allocation and deallocation are a mutex-guarded pointer
//! pop and push with no per-cell bookkeeping anywhere else.
//!
//! # Key Features
//!
//! - **One mapping, fixed capacity**: all memory is acquired up front; the
//!   pool never grows and never touches the global allocator on the
//!   allocation path
//! - **Intrusive free list**: a free cell's first word holds the link to the
//!   next free cell; occupied cells carry no overhead beyond the fixed
//!   32-byte header slot
//! - **16-byte aligned payloads**: every returned pointer is aligned to at
//!   least 16 bytes
//! - **Bulk reset**: [`reset()`][FixedPool::reset] returns every cell to the
//!   free list and wipes the whole region in one pass
//! - **Thread safety**: every operation is serialized by one internal mutex;
//!   the pool is `Send + Sync`
//!
//! # Examples
//!
//! ```rust
//! use std::num::NonZero;
//!
//! use fixed_pool::FixedPool;
//!
//! let pool = FixedPool::builder()
//!     .capacity(NonZero::new(128).unwrap())
//!     .object_size(64)
//!     .build()?;
//!
//! let ptr = pool.allocate().expect("fresh pool has free cells");
//!
//! // The payload is ours until freed; fresh cells read as zero.
//! // SAFETY: `ptr` is valid for `payload_size()` bytes and exclusively ours.
//! unsafe {
//!     assert_eq!(ptr.read(), 0);
//!     ptr.write(0x2A);
//! }
//!
//! // SAFETY: `ptr` came from this pool and is freed exactly once.
//! unsafe { pool.free(ptr) };
//! # Ok::<(), std::io::Error>(())
//! ```

mod builder;
mod pool;

pub use builder::FixedPoolBuilder;
pub use pool::FixedPool;
