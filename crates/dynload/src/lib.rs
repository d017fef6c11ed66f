//! # dynload
//!
//! Load a shared library by directory and base name, then look its symbols
//! up by raw name, by demangled C++ name, or by offset from the load base.
//!
//! ```no_run
//! use dynload::{Library, SymbolParams};
//!
//! # fn main() -> dynload::Result<()> {
//! let lib = unsafe { Library::open("/usr/lib", "m", true)? };
//! let cos = unsafe { lib.get::<extern "C" fn(f64) -> f64>("cos")? };
//! assert_eq!(cos(0.0), 1.0);
//!
//! let exported = lib.symbols(SymbolParams::new().loadable(true))?;
//! assert!(exported.iter().any(|s| s == "cos"));
//! # Ok(())
//! # }
//! ```
//!
//! POSIX systems go through `dlopen`/`dlsym`, Windows through
//! `LoadLibraryA`/`GetProcAddress`. Symbol enumeration reads the ELF,
//! Mach-O or PE symbol tables through `dynload-core`, which uses the `object`
//! crate.

pub mod demangle;
pub mod error;
mod library;
pub mod platform;
mod symbols;

pub use dynload_core::{
    FILENAME_COMPONENTS, FilenameComponents, OffsetMode, compose_path, offset_mode, set_offset_mode,
};
pub use error::{Error, ErrorKind, Result};
pub use library::{Library, Lookup, Symbol, SymbolAddress, UncheckedAddress};
pub use platform::{NativeHandle, NativePlatform, Platform};
pub use symbols::SymbolParams;
