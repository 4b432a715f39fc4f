use std::io;
use std::num::NonZero;
use std::ptr::NonNull;

use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAlloc, VirtualFree,
};
use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

/// Maps `len` bytes of fresh anonymous read-write memory.
///
/// The mapping is page-aligned and zero-initialized by the kernel. Failure is
/// reported through the calling thread's last OS error.
pub(crate) fn map_anonymous(len: NonZero<usize>) -> Result<NonNull<u8>, io::Error> {
    // SAFETY: We are passing valid arguments; reserving and committing a
    // fresh region has no other safety requirements.
    let ptr = unsafe { VirtualAlloc(None, len.get(), MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };

    NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
}

/// Returns a mapping obtained from [`map_anonymous`] to the operating system.
///
/// # Safety
///
/// `ptr` must identify a mapping previously returned by [`map_anonymous`]
/// that has not already been unmapped. No pointer into the mapping may be
/// used afterwards.
pub(crate) unsafe fn unmap(ptr: NonNull<u8>, _len: NonZero<usize>) {
    // SAFETY: Caller guarantees this is a live mapping of ours. MEM_RELEASE
    // requires a size of zero and releases the whole original reservation.
    let result = unsafe { VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) };

    assert!(result.is_ok(), "{}", io::Error::last_os_error());
}

/// Returns the size of a virtual memory page on this system.
pub(crate) fn page_size() -> NonZero<usize> {
    let mut info = SYSTEM_INFO::default();

    // SAFETY: We are passing a valid pointer to a SYSTEM_INFO we own.
    unsafe { GetSystemInfo(&raw mut info) };

    // Every platform we target reports a sane power-of-two page size.
    NonZero::new(info.dwPageSize as usize)
        .expect("operating system reported a nonsensical page size")
}
