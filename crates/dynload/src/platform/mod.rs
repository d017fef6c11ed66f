//! Native loader backends.
//!
//! [`Platform`] is the seam between [`crate::Library`] and the operating
//! system: loading, lookup, unloading, the loader's diagnostic text, the load
//! base, and raw symbol enumeration. The handle-taking methods are `unsafe`
//! because the native backends pass the handle straight to the system loader.

use std::ffi::{CStr, c_void};
use std::ptr::NonNull;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use posix::PosixPlatform;
#[cfg(windows)]
pub use windows::WindowsPlatform;

/// Backend used by [`crate::Library`] when none is named.
#[cfg(unix)]
pub type NativePlatform = PosixPlatform;
/// Backend used by [`crate::Library`] when none is named.
#[cfg(windows)]
pub type NativePlatform = WindowsPlatform;

/// Opaque, non-null library handle (`void*` from `dlopen`, `HMODULE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(NonNull<c_void>);

// Loader handles are process-wide and valid on any thread.
unsafe impl Send for NativeHandle {}

impl NativeHandle {
    #[must_use]
    pub const fn new(ptr: NonNull<c_void>) -> Self {
        Self(ptr)
    }

    #[must_use]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Operating-system loader operations.
///
/// # Safety contract for handle-taking methods
///
/// Every `unsafe fn` taking a [`NativeHandle`] requires that the handle was
/// returned by `open` on the same platform and has not been passed to
/// `close` yet.
pub trait Platform {
    /// Backing file kept open for symbol enumeration. Platforms that read
    /// symbols from the mapped image use [`std::convert::Infallible`].
    type File;

    /// Load the library at `path`, running its initializers.
    ///
    /// # Safety
    ///
    /// Initializers of the loaded library run with no further checks; the
    /// caller vouches that loading it is sound.
    unsafe fn open(&self, path: &CStr) -> Option<NativeHandle>;

    /// Look up `name`, returning `None` if absent or null.
    ///
    /// # Safety
    ///
    /// See the trait-level contract.
    unsafe fn resolve(&self, handle: NativeHandle, name: &CStr) -> Option<NonNull<c_void>>;

    /// Unload, returning the loader's diagnostic on failure.
    ///
    /// # Safety
    ///
    /// See the trait-level contract. The handle must not be used afterwards.
    unsafe fn close(&self, handle: NativeHandle) -> Result<(), String>;

    /// Text of the most recent loader failure on this thread.
    fn last_error(&self) -> String;

    /// Address the library image is mapped at.
    ///
    /// # Safety
    ///
    /// See the trait-level contract.
    unsafe fn base_address(&self, handle: NativeHandle) -> Option<usize>;

    /// Open the library file for later enumeration, or `Ok(None)` if this
    /// platform does not need it.
    fn open_file(&self, path: &CStr) -> Result<Option<Self::File>, String>;

    /// Every exported symbol name, undecorated, in table order.
    ///
    /// # Safety
    ///
    /// See the trait-level contract.
    unsafe fn raw_symbols(
        &self,
        handle: NativeHandle,
        file: Option<&Self::File>,
    ) -> Result<Vec<String>, String>;
}
