//! Black-box tests exercising `FixedPool` through its public API only.

use std::collections::HashSet;
use std::num::NonZero;
use std::thread;

use fixed_pool::FixedPool;

#[test]
fn every_payload_is_sixteen_byte_aligned() {
    let pool = FixedPool::builder()
        .capacity(NonZero::new(50).unwrap())
        .object_size(40)
        .build()
        .unwrap();

    let mut ptrs = Vec::new();
    while let Some(ptr) = pool.allocate() {
        assert_eq!(ptr.addr().get() % 16, 0);
        ptrs.push(ptr);
    }
    assert_eq!(ptrs.len(), 50);

    for ptr in ptrs {
        // SAFETY: Each pointer came from this pool and is freed once.
        unsafe { pool.free(ptr) };
    }
}

#[test]
fn outstanding_allocations_never_overlap() {
    let pool = FixedPool::builder()
        .capacity(NonZero::new(64).unwrap())
        .object_size(64)
        .build()
        .unwrap();

    let payload = pool.payload_size();
    let mut ptrs = Vec::new();
    while let Some(ptr) = pool.allocate() {
        ptrs.push(ptr);
    }

    let mut ranges: Vec<_> = ptrs
        .iter()
        .map(|ptr| (ptr.addr().get(), ptr.addr().get() + payload))
        .collect();
    ranges.sort_unstable();

    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "payload ranges overlap: {pair:?}");
    }

    for ptr in ptrs {
        // SAFETY: Each pointer came from this pool and is freed once.
        unsafe { pool.free(ptr) };
    }
}

#[test]
fn exhaustion_is_not_sticky() {
    let pool = FixedPool::builder()
        .capacity(NonZero::new(2).unwrap())
        .object_size(32)
        .build()
        .unwrap();

    let a = pool.allocate().unwrap();
    let b = pool.allocate().unwrap();
    assert_eq!(pool.allocate(), None);
    assert_eq!(pool.allocate(), None);

    // SAFETY: Both pointers came from this pool and are freed once.
    unsafe {
        pool.free(a);
        pool.free(b);
    }

    assert!(pool.allocate().is_some());
}

#[test]
fn concurrent_round_trips_preserve_data_integrity() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    let pool = FixedPool::builder()
        .capacity(NonZero::new(THREADS).unwrap())
        .object_size(96)
        .build()
        .unwrap();

    thread::scope(|scope| {
        for tag in 0..THREADS {
            let pool = &pool;
            scope.spawn(move || {
                let tag = u8::try_from(tag).unwrap();

                for _ in 0..ROUNDS {
                    // The capacity matches the thread count, so every thread
                    // always finds a cell.
                    let ptr = pool.allocate().expect("one cell per thread is reserved");

                    for offset in 0..pool.payload_size() {
                        // SAFETY: The cell is exclusively ours until freed.
                        unsafe { ptr.add(offset).write(tag) };
                    }
                    for offset in 0..pool.payload_size() {
                        // SAFETY: Same range as written above.
                        assert_eq!(unsafe { ptr.add(offset).read() }, tag);
                    }

                    // SAFETY: Freed exactly once, not used again.
                    unsafe { pool.free(ptr) };
                }
            });
        }
    });

    assert!(pool.is_empty());
}

#[test]
fn concurrent_allocation_hands_out_distinct_cells() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;

    let pool = FixedPool::builder()
        .capacity(NonZero::new(THREADS * PER_THREAD).unwrap())
        .object_size(48)
        .build()
        .unwrap();

    let ptrs: Vec<usize> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let pool = &pool;
                scope.spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| pool.allocate().unwrap().addr().get())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let distinct: HashSet<_> = ptrs.iter().copied().collect();
    assert_eq!(distinct.len(), THREADS * PER_THREAD);
}

#[test]
fn pool_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<FixedPool>();
}
