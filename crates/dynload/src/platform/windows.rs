//! `LoadLibrary` backend for Windows.
//!
//! An `HMODULE` is the address the image is mapped at, so the base address
//! is the handle itself and the export directory is read straight from the
//! mapped headers. No file descriptor is kept.

use std::convert::Infallible;
use std::ffi::{CStr, CString, c_void};
use std::ptr::NonNull;

use windows_sys::Win32::Foundation::{FreeLibrary, GetLastError, HMODULE};
use windows_sys::Win32::System::Diagnostics::Debug::{
    FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageA,
};
use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryA};

use dynload_core::image;

use super::{NativeHandle, Platform};

const UNKNOWN_LAST_ERROR: &str = "Unknown error (GetLastError failed)";
const UNKNOWN_FORMAT_MESSAGE: &str = "Unknown error (FormatMessage failed)";

/// MAKELANGID(LANG_ENGLISH, SUBLANG_ENGLISH_US)
const LANG_ENGLISH_US: u32 = 0x0409;

/// DOS, COFF and optional headers always fit in the first page.
const HEADER_PAGE: usize = 0x1000;

/// `LoadLibraryA` loader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowsPlatform;

impl Platform for WindowsPlatform {
    type File = Infallible;

    unsafe fn open(&self, path: &CStr) -> Option<NativeHandle> {
        // LoadLibrary wants backslashes once a path is given.
        let native: Vec<u8> = path
            .to_bytes()
            .iter()
            .map(|&b| if b == b'/' { b'\\' } else { b })
            .collect();
        let native = CString::new(native).ok()?;
        let module: HMODULE = unsafe { LoadLibraryA(native.as_ptr().cast()) };
        NonNull::new(module).map(NativeHandle::new)
    }

    unsafe fn resolve(&self, handle: NativeHandle, name: &CStr) -> Option<NonNull<c_void>> {
        let proc = unsafe { GetProcAddress(handle.as_ptr(), name.as_ptr().cast()) }?;
        NonNull::new(proc as *mut c_void)
    }

    unsafe fn close(&self, handle: NativeHandle) -> Result<(), String> {
        if unsafe { FreeLibrary(handle.as_ptr()) } != 0 {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    fn last_error(&self) -> String {
        let code = unsafe { GetLastError() };
        if code == 0 {
            return UNKNOWN_LAST_ERROR.to_string();
        }
        let mut buf = [0u8; 512];
        let len = unsafe {
            FormatMessageA(
                FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
                std::ptr::null(),
                code,
                LANG_ENGLISH_US,
                buf.as_mut_ptr(),
                buf.len() as u32,
                std::ptr::null(),
            )
        };
        if len == 0 {
            return UNKNOWN_FORMAT_MESSAGE.to_string();
        }
        String::from_utf8_lossy(&buf[..len as usize])
            .trim_end()
            .to_string()
    }

    unsafe fn base_address(&self, handle: NativeHandle) -> Option<usize> {
        Some(handle.addr())
    }

    fn open_file(&self, _path: &CStr) -> Result<Option<Infallible>, String> {
        Ok(None)
    }

    unsafe fn raw_symbols(
        &self,
        handle: NativeHandle,
        _file: Option<&Infallible>,
    ) -> Result<Vec<String>, String> {
        let base = handle.as_ptr().cast::<u8>().cast_const();
        let headers = unsafe { std::slice::from_raw_parts(base, HEADER_PAGE) };
        let size = image::mapped_image_size(headers).map_err(|e| e.to_string())?;
        let mapped = unsafe { std::slice::from_raw_parts(base, size.max(HEADER_PAGE)) };
        image::mapped_export_names(mapped).map_err(|e| e.to_string())
    }
}
