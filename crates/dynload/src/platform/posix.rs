//! `dlopen` backend for Linux, the BSDs and macOS.
//!
//! Libraries are opened with `RTLD_NOW | RTLD_LOCAL`. Symbol enumeration
//! reads the ELF or Mach-O file through the descriptor kept since `open`,
//! so a file replaced on disk after loading is still read consistently.

use std::ffi::{CStr, OsStr, c_void};
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::ptr::NonNull;

use super::{NativeHandle, Platform};

const UNKNOWN_DLERROR: &str = "Unknown error (dlerror failed)";

/// `dlfcn.h` loader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PosixPlatform;

impl Platform for PosixPlatform {
    type File = File;

    unsafe fn open(&self, path: &CStr) -> Option<NativeHandle> {
        let raw = unsafe { libc::dlopen(path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        NonNull::new(raw).map(NativeHandle::new)
    }

    unsafe fn resolve(&self, handle: NativeHandle, name: &CStr) -> Option<NonNull<c_void>> {
        NonNull::new(unsafe { libc::dlsym(handle.as_ptr(), name.as_ptr()) })
    }

    unsafe fn close(&self, handle: NativeHandle) -> Result<(), String> {
        if unsafe { libc::dlclose(handle.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    fn last_error(&self) -> String {
        let msg = unsafe { libc::dlerror() };
        if msg.is_null() {
            return UNKNOWN_DLERROR.to_string();
        }
        unsafe { CStr::from_ptr(msg) }
            .to_string_lossy()
            .into_owned()
    }

    unsafe fn base_address(&self, handle: NativeHandle) -> Option<usize> {
        unsafe { image_base(handle) }
    }

    fn open_file(&self, path: &CStr) -> Result<Option<File>, String> {
        File::open(OsStr::from_bytes(path.to_bytes()))
            .map(Some)
            .map_err(|e| e.to_string())
    }

    unsafe fn raw_symbols(
        &self,
        _handle: NativeHandle,
        file: Option<&File>,
    ) -> Result<Vec<String>, String> {
        let file = file.ok_or("library file is not open")?;
        let image = read_image(file).map_err(|e| format!("failed to read library file: {e}"))?;
        dynload_core::symbol_names(&image).map_err(|e| e.to_string())
    }
}

/// Whole file contents via positioned reads; the descriptor's offset is untouched.
fn read_image(file: &File) -> std::io::Result<Vec<u8>> {
    let len = usize::try_from(file.metadata()?.len())
        .map_err(|_| std::io::Error::other("library file too large"))?;
    let mut image = vec![0u8; len];
    file.read_exact_at(&mut image, 0)?;
    Ok(image)
}

// ---------------------------------------------------------------------------
// Load base
// ---------------------------------------------------------------------------

#[cfg(any(target_os = "linux", target_os = "freebsd"))]
mod link_map {
    use std::ffi::{c_char, c_int, c_void};

    pub const RTLD_DI_LINKMAP: c_int = 2;

    /// Leading fields of `struct link_map`, shared by glibc, musl and FreeBSD.
    #[repr(C)]
    pub struct LinkMap {
        pub l_addr: usize,
        pub l_name: *const c_char,
        pub l_ld: *mut c_void,
        pub l_next: *mut LinkMap,
        pub l_prev: *mut LinkMap,
    }

    unsafe extern "C" {
        pub fn dlinfo(handle: *mut c_void, request: c_int, info: *mut c_void) -> c_int;
    }
}

#[cfg(any(target_os = "linux", target_os = "freebsd"))]
unsafe fn image_base(handle: NativeHandle) -> Option<usize> {
    use link_map::{LinkMap, RTLD_DI_LINKMAP, dlinfo};

    let mut map: *mut LinkMap = std::ptr::null_mut();
    let rc = unsafe {
        dlinfo(
            handle.as_ptr(),
            RTLD_DI_LINKMAP,
            (&raw mut map).cast::<c_void>(),
        )
    };
    if rc != 0 || map.is_null() {
        return None;
    }
    Some(unsafe { (*map).l_addr })
}

#[cfg(target_vendor = "apple")]
unsafe extern "C" {
    fn _dyld_image_count() -> u32;
    fn _dyld_get_image_header(index: u32) -> *const c_void;
    fn _dyld_get_image_name(index: u32) -> *const std::ffi::c_char;
}

/// dyld does not map handles to headers directly. Re-open each loaded image
/// with `RTLD_NOLOAD` and compare the handle it yields with ours.
#[cfg(target_vendor = "apple")]
unsafe fn image_base(handle: NativeHandle) -> Option<usize> {
    let count = unsafe { _dyld_image_count() };
    for index in 0..count {
        let name = unsafe { _dyld_get_image_name(index) };
        if name.is_null() {
            continue;
        }
        let existing = unsafe { libc::dlopen(name, libc::RTLD_NOLOAD | libc::RTLD_LAZY) };
        if existing.is_null() {
            continue;
        }
        unsafe { libc::dlclose(existing) };
        if existing == handle.as_ptr() {
            let header = unsafe { _dyld_get_image_header(index) };
            return (!header.is_null()).then_some(header as usize);
        }
    }
    None
}

#[cfg(not(any(target_os = "linux", target_os = "freebsd", target_vendor = "apple")))]
unsafe fn image_base(_handle: NativeHandle) -> Option<usize> {
    None
}
