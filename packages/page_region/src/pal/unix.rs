use std::num::NonZero;
use std::ptr::NonNull;
use std::{io, ptr};

/// Maps `len` bytes of fresh anonymous read-write memory.
///
/// The mapping is page-aligned and zero-initialized by the kernel. Failure is
/// reported through the calling thread's last OS error.
pub(crate) fn map_anonymous(len: NonZero<usize>) -> Result<NonNull<u8>, io::Error> {
    // SAFETY: We are passing valid arguments; an anonymous private mapping
    // has no other safety requirements.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len.get(),
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
}

/// Returns a mapping obtained from [`map_anonymous`] to the operating system.
///
/// # Safety
///
/// `ptr` and `len` must identify a mapping previously returned by
/// [`map_anonymous`] that has not already been unmapped. No pointer into the
/// mapping may be used afterwards.
pub(crate) unsafe fn unmap(ptr: NonNull<u8>, len: NonZero<usize>) {
    // SAFETY: Caller guarantees this is a live mapping of ours; the kernel
    // extends the length to whole pages on its own.
    let result = unsafe { libc::munmap(ptr.as_ptr().cast(), len.get()) };

    assert!(result == 0, "{}", io::Error::last_os_error());
}

/// Returns the size of a virtual memory page on this system.
pub(crate) fn page_size() -> NonZero<usize> {
    // SAFETY: No safety requirements.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    // Every platform we target reports a sane power-of-two page size.
    usize::try_from(raw)
        .ok()
        .and_then(NonZero::new)
        .expect("operating system reported a nonsensical page size")
}
