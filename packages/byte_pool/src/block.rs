use std::ptr::NonNull;

use static_assertions::{const_assert, const_assert_eq};

/// Stride of the metadata slot that precedes every payload. The pointer
/// returned to callers is always `header + HEADER_SIZE`.
pub(crate) const HEADER_SIZE: usize = 32;

/// Floor alignment of every payload and every header. Requested sizes are
/// rounded up to a multiple of this and requested alignments are raised to
/// at least this, which keeps every header naturally aligned no matter how
/// blocks are split and merged.
pub(crate) const BASE_ALIGNMENT: usize = 16;

/// Minimum leftover payload that justifies splitting a free block instead of
/// handing the whole block out.
pub(crate) const MIN_SPLIT: usize = 16;

const_assert!(size_of::<BlockHeader>() <= HEADER_SIZE);
const_assert!(align_of::<BlockHeader>() <= BASE_ALIGNMENT);
const_assert_eq!(HEADER_SIZE % BASE_ALIGNMENT, 0);

/// Metadata stored in the 32-byte slot immediately before every payload.
///
/// While a block is live, `next_free` is unused; while it sits on the free
/// list, `next_free` chains it to the next free block. The bytes between
/// `size_of::<BlockHeader>()` and `HEADER_SIZE` are dead padding.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct BlockHeader {
    /// Usable bytes in the payload that follows this header.
    pub(crate) payload_size: usize,

    /// Bytes skipped between the bump cursor and this header to honor the
    /// requested alignment. Zero for blocks minted by splitting.
    pub(crate) padding: usize,

    /// Link to the next free block while this block is on the free list.
    pub(crate) next_free: Option<NonNull<BlockHeader>>,
}

impl BlockHeader {
    /// The payload address of the block owning `header`.
    #[must_use]
    pub(crate) fn payload_ptr(header: NonNull<BlockHeader>) -> NonNull<u8> {
        // SAFETY: A header is always followed by its payload inside the same
        // region, so the offset stays in bounds.
        unsafe { header.cast::<u8>().add(HEADER_SIZE) }
    }

    /// Recovers the header address from a payload pointer handed to a caller.
    ///
    /// # Safety
    ///
    /// `payload` must be a pointer previously produced by
    /// [`payload_ptr()`][Self::payload_ptr] for a block that is still live.
    #[must_use]
    pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<BlockHeader> {
        // SAFETY: Caller guarantees the payload sits HEADER_SIZE bytes past
        // its header inside the same region.
        unsafe { payload.sub(HEADER_SIZE) }.cast::<BlockHeader>()
    }

    /// One-past-the-end address of the block owning `header`: the first byte
    /// after its payload. Two free blocks are physically adjacent exactly
    /// when one's end address equals the other's header address.
    #[must_use]
    pub(crate) fn end_addr(header: NonNull<BlockHeader>) -> usize {
        // SAFETY: Headers of tracked blocks are valid for reads.
        let payload_size = unsafe { header.as_ref() }.payload_size;

        header.addr().get() + HEADER_SIZE + payload_size
    }
}
