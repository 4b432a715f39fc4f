//! Basic example of `BytePool` usage: mixed-size allocations, reuse after
//! free, and growth for an oversized request.

use std::alloc::Layout;
use std::num::NonZero;

use byte_pool::BytePool;

fn main() -> Result<(), std::io::Error> {
    let pool = BytePool::builder()
        .initial_region_size(NonZero::new(4096).unwrap())
        .build()?;

    // A couple of small blocks come straight off the bump cursor.
    let a = pool.allocate(Layout::from_size_align(64, 16).unwrap()).unwrap();
    let b = pool.allocate(Layout::from_size_align(200, 32).unwrap()).unwrap();
    println!("a = {a:p}, b = {b:p}, regions = {}", pool.region_count());

    // Freeing both coalesces them into one reusable block.
    // SAFETY: Both pointers came from this pool and are freed exactly once.
    unsafe {
        pool.free(a);
        pool.free(b);
    }
    println!("after frees, free blocks = {}", pool.free_block_count());

    // A request bigger than the whole region forces the chain to grow.
    let big = pool
        .allocate(Layout::from_size_align(8192, 16).unwrap())
        .unwrap();
    println!("big = {big:p}, regions = {}", pool.region_count());

    // SAFETY: `big` came from this pool and is freed exactly once.
    unsafe { pool.free(big) };

    // Reset keeps the grown chain but forgets every block.
    // SAFETY: No pointer handed out above is used after this point.
    unsafe { pool.reset() };
    println!(
        "after reset, regions = {}, free blocks = {}",
        pool.region_count(),
        pool.free_block_count()
    );

    Ok(())
}
