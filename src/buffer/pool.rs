//! Thread-local pool of fixed-size buffer blocks.
//!
//! The connector is single-threaded cooperative, so a thread-local free list
//! gives allocation without contention. Allocation failure is fatal (the
//! global allocator aborts); deallocation never fails.

use std::cell::RefCell;

/// Usable size of a single block's data area.
pub(crate) const BLOCK_SIZE: usize = 4096;

/// How many freed blocks the pool keeps for reuse; surplus is released
/// to the allocator.
const RETAIN_LIMIT: usize = 64;

thread_local! {
    static FREE_BLOCKS: RefCell<Vec<Box<[u8; BLOCK_SIZE]>>> = RefCell::new(Vec::new());
}

/// Take a chunk from the pool, allocating a fresh one when the pool is empty.
pub(crate) fn allocate() -> Box<[u8; BLOCK_SIZE]> {
    FREE_BLOCKS
        .with(|pool| pool.borrow_mut().pop())
        .unwrap_or_else(|| Box::new([0u8; BLOCK_SIZE]))
}

/// Return a chunk to the pool.
pub(crate) fn deallocate(chunk: Box<[u8; BLOCK_SIZE]>) {
    FREE_BLOCKS.with(|pool| {
        let mut pool = pool.borrow_mut();
        if pool.len() < RETAIN_LIMIT {
            pool.push(chunk);
        }
    });
}

#[cfg(test)]
pub(crate) fn pooled_blocks() -> usize {
    FREE_BLOCKS.with(|pool| pool.borrow().len())
}
