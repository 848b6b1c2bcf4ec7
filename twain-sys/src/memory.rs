//! Movable global memory, the allocation kind the manager exchanges for
//! capability containers and native bitmaps.

use crate::TW_HANDLE;
use std::ffi::c_void;
use windows_sys::Win32::System::Memory::{
    GlobalAlloc, GlobalFree, GlobalLock, GlobalSize, GlobalUnlock, GHND,
};

/// Allocate `size` zeroed movable bytes. Returns null on failure.
///
/// # Safety
/// The returned handle must be released with [`free`].
pub unsafe fn alloc(size: usize) -> TW_HANDLE {
    GlobalAlloc(GHND, size) as _
}

/// Lock a handle and return a pointer to its bytes.
///
/// # Safety
/// `handle` must be a live global-memory handle.
pub unsafe fn lock(handle: TW_HANDLE) -> *mut c_void {
    GlobalLock(handle as _) as _
}

/// # Safety
/// `handle` must be a live global-memory handle locked by [`lock`].
pub unsafe fn unlock(handle: TW_HANDLE) {
    GlobalUnlock(handle as _);
}

/// # Safety
/// `handle` must be a live global-memory handle; it is invalid afterwards.
pub unsafe fn free(handle: TW_HANDLE) {
    GlobalFree(handle as _);
}

/// # Safety
/// `handle` must be a live global-memory handle.
pub unsafe fn size(handle: TW_HANDLE) -> usize {
    GlobalSize(handle as _)
}
