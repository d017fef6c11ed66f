//! The owning library handle and the address types it hands out.

use std::ffi::{CStr, CString, c_void};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::NonNull;

use dynload_core::{MatchOutcome, compose_path, offset_mode};
use tracing::{debug, warn};

use crate::demangle::demangle;
use crate::error::{Error, Result};
use crate::platform::{NativeHandle, NativePlatform, Platform};
use crate::symbols::{self, SymbolParams};

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Address the loader returned for a named symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(NonNull<c_void>);

impl SymbolAddress {
    #[must_use]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddress({:#x})", self.addr())
    }
}

/// How a name lookup succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The loader knew the name as given.
    Direct,
    /// Matched through its demangled form; holds the raw name that resolved.
    Demangled(String),
}

/// `base + offset`, computed without consulting the symbol table.
///
/// Nothing guarantees that code or data lives here; treat it as a raw
/// integer until proven otherwise.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UncheckedAddress(usize);

impl UncheckedAddress {
    #[must_use]
    pub const fn addr(self) -> usize {
        self.0
    }

    #[must_use]
    pub fn as_ptr(self) -> *const c_void {
        self.0 as *const c_void
    }
}

impl fmt::Debug for UncheckedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UncheckedAddress({:#x})", self.0)
    }
}

/// Typed view of a symbol, borrowing the library it came from.
///
/// `T` is normally a function pointer type; dereferencing yields it.
pub struct Symbol<'lib, T> {
    address: SymbolAddress,
    _lib: PhantomData<&'lib T>,
}

impl<T> Symbol<'_, T> {
    #[must_use]
    pub fn address(&self) -> SymbolAddress {
        self.address
    }
}

impl<T> Deref for Symbol<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // `get` checked that T is pointer-sized.
        unsafe { &*(&raw const self.address.0).cast::<T>() }
    }
}

impl<T> fmt::Debug for Symbol<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Symbol").field(&self.address).finish()
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// A loaded dynamic library, unloaded on drop.
///
/// A `Library` is either loaded or cleared. Cleared instances come from
/// [`Default`] or from [`Library::take`]; every query on them fails with
/// [`Error::Logic`] except [`Library::has_symbol`], which returns `false`.
pub struct Library<P: Platform = NativePlatform> {
    handle: Option<NativeHandle>,
    file: Option<P::File>,
    platform: P,
}

impl Library<NativePlatform> {
    /// Load `name` from `dir` with the native loader.
    ///
    /// With `decorations`, `name` gets the platform prefix and suffix
    /// (`lib<name>.so`, `lib<name>.dylib`, `<name>.dll`). An empty `dir`
    /// leaves the path relative so the loader's own search rules apply.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initializers and, on unload, its
    /// finalizers. The caller vouches that doing so is sound.
    pub unsafe fn open(dir: &str, name: &str, decorations: bool) -> Result<Self> {
        unsafe { Self::open_with(NativePlatform::default(), dir, name, decorations) }
    }
}

impl<P: Platform> Library<P> {
    /// [`Library::open`] through an explicit platform backend.
    ///
    /// # Safety
    ///
    /// As for [`Library::open`].
    pub unsafe fn open_with(platform: P, dir: &str, name: &str, decorations: bool) -> Result<Self> {
        let path = compose_path(dir, name, decorations);
        let c_path = CString::new(path.as_str()).map_err(|_| {
            Error::InvalidArgument(format!("Library path contains a NUL byte: {path:?}"))
        })?;

        let Some(handle) = (unsafe { platform.open(&c_path) }) else {
            return Err(Error::Load {
                reason: platform.last_error(),
                path,
            });
        };
        debug!(path = %path, handle = format_args!("{:#x}", handle.addr()), "library loaded");

        // From here on, an early return drops `lib` and unloads the handle.
        let mut lib = Self {
            handle: Some(handle),
            file: None,
            platform,
        };
        lib.file = lib
            .platform
            .open_file(&c_path)
            .map_err(|e| Error::Load {
                path,
                reason: format!("Could not read library file ({e})"),
            })?;
        Ok(lib)
    }

    /// Move the loaded state out, leaving `self` cleared.
    #[must_use]
    pub fn take(&mut self) -> Self
    where
        P: Default,
    {
        mem::take(self)
    }

    /// Whether this instance holds a library.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// The loader handle, if loaded.
    #[must_use]
    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.handle
    }

    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    fn loaded(&self) -> Result<NativeHandle> {
        self.handle.ok_or_else(Error::null_handle)
    }

    fn raw_symbols(&self, handle: NativeHandle) -> Result<Vec<String>> {
        unsafe { self.platform.raw_symbols(handle, self.file.as_ref()) }.map_err(Error::Symbol)
    }

    fn lookup(&self, handle: NativeHandle, name: &CStr) -> Option<NonNull<c_void>> {
        unsafe { self.platform.resolve(handle, name) }
    }

    fn lookup_str(&self, handle: NativeHandle, name: &str) -> Option<NonNull<c_void>> {
        let name = CString::new(name).ok()?;
        self.lookup(handle, &name)
    }

    // -----------------------------------------------------------------------
    // Resolution by name
    // -----------------------------------------------------------------------

    /// Address of `name`.
    ///
    /// The raw name is tried first. If the loader does not know it, every
    /// exported symbol is demangled and the one whose demangled form is
    /// `name` or `name(...)` is used; C++ callers can therefore ask for
    /// `"tools::sum"` instead of `_ZN5tools3sumEPKdm`. Zero matches is an
    /// [`Error::Symbol`], several is an [`Error::AmbiguousSymbol`].
    pub fn resolve(&self, name: &str) -> Result<SymbolAddress> {
        self.find(&c_name(name)?).map(|(addr, _)| addr)
    }

    /// [`Library::resolve`] for a name that is already NUL-terminated.
    pub fn resolve_cstr(&self, name: &CStr) -> Result<SymbolAddress> {
        self.find(name).map(|(addr, _)| addr)
    }

    /// [`Library::resolve`], also reporting whether the raw name or the
    /// demangled fallback produced the address.
    pub fn resolve_detailed(&self, name: &str) -> Result<(SymbolAddress, Lookup)> {
        self.find(&c_name(name)?)
    }

    fn find(&self, name: &CStr) -> Result<(SymbolAddress, Lookup)> {
        let handle = self.loaded()?;
        if let Some(addr) = self.lookup(handle, name) {
            return Ok((SymbolAddress(addr), Lookup::Direct));
        }
        let diagnostic = self.platform.last_error();
        let requested = name.to_string_lossy();

        let raw = self.raw_symbols(handle)?;
        match MatchOutcome::scan(raw.iter().map(String::as_str), &requested, demangle) {
            MatchOutcome::None => Err(Error::Symbol(format!(
                "Could not get symbol '{requested}'\n{diagnostic}"
            ))),
            MatchOutcome::Unique(mangled) => {
                debug!(requested = %requested, mangled, "resolved through demangled name");
                let addr = self.lookup_str(handle, mangled).ok_or_else(|| {
                    Error::Symbol(format!(
                        "Could not get symbol '{requested}' ({mangled})\n{}",
                        self.platform.last_error()
                    ))
                })?;
                Ok((SymbolAddress(addr), Lookup::Demangled(mangled.to_string())))
            }
            MatchOutcome::Ambiguous(candidates) => Err(Error::AmbiguousSymbol {
                name: requested.into_owned(),
                candidates: candidates.into_iter().map(String::from).collect(),
            }),
        }
    }

    /// Resolve `name` and view it as a `T`, typically a function pointer.
    ///
    /// # Safety
    ///
    /// `T` must match the symbol's real type. Fails with
    /// [`Error::InvalidArgument`] if `T` is not pointer-sized.
    pub unsafe fn get<T>(&self, name: &str) -> Result<Symbol<'_, T>> {
        if mem::size_of::<T>() != mem::size_of::<*mut c_void>() {
            return Err(Error::InvalidArgument(format!(
                "Symbol type {} is not pointer-sized",
                std::any::type_name::<T>()
            )));
        }
        Ok(Symbol {
            address: self.resolve(name)?,
            _lib: PhantomData,
        })
    }

    /// Whether `name` resolves directly. Never fails; cleared libraries and
    /// names with NUL bytes report `false`. No demangled fallback is tried.
    #[must_use]
    pub fn has_symbol(&self, name: &str) -> bool {
        self.handle
            .is_some_and(|handle| self.lookup_str(handle, name).is_some())
    }

    /// [`Library::has_symbol`] for a NUL-terminated name.
    #[must_use]
    pub fn has_symbol_cstr(&self, name: &CStr) -> bool {
        self.handle
            .is_some_and(|handle| self.lookup(handle, name).is_some())
    }

    // -----------------------------------------------------------------------
    // Resolution by offset
    // -----------------------------------------------------------------------

    /// Load base of the library image.
    pub fn base_address(&self) -> Result<usize> {
        let handle = self.loaded()?;
        unsafe { self.platform.base_address(handle) }.ok_or_else(|| {
            Error::Symbol("Could not determine the library base address".to_string())
        })
    }

    /// `base + offset`.
    ///
    /// Under [`dynload_core::OffsetMode::Validated`] this behaves like
    /// [`Library::resolve_at_checked`]; otherwise the sum is returned as-is.
    pub fn resolve_at(&self, offset: isize) -> Result<UncheckedAddress> {
        if offset_mode().validates() {
            return self
                .resolve_at_checked(offset)
                .map(|addr| UncheckedAddress(addr.addr()));
        }
        self.offset_address(offset).map(UncheckedAddress)
    }

    /// `base + offset`, accepted only if some loadable symbol lives there.
    pub fn resolve_at_checked(&self, offset: isize) -> Result<SymbolAddress> {
        let target = self.offset_address(offset)?;
        let handle = self.loaded()?;
        self.raw_symbols(handle)?
            .iter()
            .filter_map(|name| self.lookup_str(handle, name))
            .find(|addr| addr.as_ptr() as usize == target)
            .map(SymbolAddress)
            .ok_or_else(|| Error::Symbol(format!("Could not find symbol at offset {offset}")))
    }

    fn offset_address(&self, offset: isize) -> Result<usize> {
        self.loaded()?;
        let offset = usize::try_from(offset).map_err(|_| {
            Error::InvalidArgument(format!("Symbol offset must be non-negative: {offset}"))
        })?;
        let base = self.base_address()?;
        let address = base.checked_add(offset).ok_or_else(|| {
            Error::InvalidArgument(format!("Symbol offset {offset:#x} overflows base {base:#x}"))
        })?;
        debug!(
            base = format_args!("{base:#x}"),
            offset = format_args!("{offset:#x}"),
            address = format_args!("{address:#x}"),
            "calculated symbol address"
        );
        Ok(address)
    }

    // -----------------------------------------------------------------------
    // Enumeration
    // -----------------------------------------------------------------------

    /// Exported symbol names in table order, filtered by `params`.
    pub fn symbols(&self, params: SymbolParams) -> Result<Vec<String>> {
        let handle = self.loaded()?;
        let raw = self.raw_symbols(handle)?;
        Ok(symbols::filter(
            raw,
            params,
            |name| self.lookup_str(handle, name).is_some(),
            demangle,
        ))
    }
}

impl<P: Platform + Default> Default for Library<P> {
    /// A cleared library.
    fn default() -> Self {
        Self {
            handle: None,
            file: None,
            platform: P::default(),
        }
    }
}

impl<P: Platform> Drop for Library<P> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(reason) = unsafe { self.platform.close(handle) } {
                warn!(handle = format_args!("{:#x}", handle.addr()), %reason, "library close failed");
            }
        }
        // Closing the backing file cannot be observed; errors are dropped with it.
        drop(self.file.take());
    }
}

impl<P: Platform> fmt::Debug for Library<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("handle", &self.handle)
            .field("file_open", &self.file.is_some())
            .finish()
    }
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name)
        .map_err(|_| Error::InvalidArgument(format!("Symbol name contains a NUL byte: {name:?}")))
}
