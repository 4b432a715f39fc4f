//! Basic example of `FixedPool` usage: a pool of fixed-size message slots.

use std::num::NonZero;

use fixed_pool::FixedPool;

fn main() -> Result<(), std::io::Error> {
    let pool = FixedPool::builder()
        .capacity(NonZero::new(4).unwrap())
        .object_size(64)
        .build()?;

    println!(
        "pool of {} cells, {} bytes stride, {} usable bytes each",
        pool.capacity(),
        pool.cell_size(),
        pool.payload_size()
    );

    // Drain the pool completely.
    let mut slots = Vec::new();
    while let Some(ptr) = pool.allocate() {
        slots.push(ptr);
    }
    println!("allocated {} slots; next allocate() -> {:?}", slots.len(), pool.allocate());

    // Stamp each slot with its own index and read it back.
    for (index, ptr) in slots.iter().enumerate() {
        // SAFETY: Each slot is exclusively ours and payload_size() bytes long.
        unsafe { ptr.write(u8::try_from(index).unwrap()) };
    }
    for (index, ptr) in slots.iter().enumerate() {
        // SAFETY: Reading back the byte written above.
        let value = unsafe { ptr.read() };
        println!("slot {index} holds {value}");
    }

    // Return everything and show the pool filled back up.
    for ptr in slots {
        // SAFETY: Each pointer came from this pool and is freed exactly once.
        unsafe { pool.free(ptr) };
    }
    println!("after frees, {} cells in use", pool.len());

    Ok(())
}
