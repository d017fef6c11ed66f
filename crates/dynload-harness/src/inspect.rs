//! Library inspection reports: symbol listings and address lookups.
//!
//! Each report names the composed library path and, when the file is
//! reachable at that path, its SHA-256 so runs against different builds of
//! the same library can be told apart.

use std::path::Path;

use dynload::{Library, Lookup, SymbolAddress, SymbolParams, compose_path};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{HarnessError, Result};

/// Which library to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySpec {
    pub dir: String,
    pub name: String,
    pub decorate: bool,
}

impl LibrarySpec {
    #[must_use]
    pub fn new(dir: impl Into<String>, name: impl Into<String>, decorate: bool) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            decorate,
        }
    }

    /// Path handed to the loader.
    #[must_use]
    pub fn path(&self) -> String {
        compose_path(&self.dir, &self.name, self.decorate)
    }

    /// Load the library.
    #[allow(unsafe_code)]
    pub fn open(&self) -> Result<Library> {
        // SAFETY: the operator picked this library to inspect; running its
        // initializers is the point of loading it.
        Ok(unsafe { Library::open(&self.dir, &self.name, self.decorate) }?)
    }
}

/// Identity of a library file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub sha256: String,
    pub size_bytes: u64,
}

/// SHA-256 of the file at `path`, or `None` if it cannot be read there
/// (for example when the loader found it on its search path).
pub fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let data = std::fs::read(path).ok()?;
    let digest = Sha256::digest(&data);
    Some(Fingerprint {
        sha256: digest.iter().map(|b| format!("{b:02x}")).collect(),
        size_bytes: data.len() as u64,
    })
}

fn hex(addr: usize) -> String {
    format!("{addr:#x}")
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolReport {
    pub library: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    pub demangle: bool,
    pub loadable: bool,
    pub count: usize,
    pub symbols: Vec<String>,
}

pub fn list_symbols(spec: &LibrarySpec, params: SymbolParams) -> Result<SymbolReport> {
    let lib = spec.open()?;
    let symbols = lib.symbols(params)?;
    let library = spec.path();
    Ok(SymbolReport {
        fingerprint: fingerprint(Path::new(&library)),
        library,
        demangle: params.demangle,
        loadable: params.loadable,
        count: symbols.len(),
        symbols,
    })
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// How a name lookup succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The loader knew the name as given.
    Direct,
    /// Found by matching demangled names.
    Demangled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveReport {
    pub library: String,
    pub symbol: String,
    pub resolution: Resolution,
    /// Raw name behind a demangled match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mangled: Option<String>,
    pub address: String,
    /// Distance from the load base, when the base is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

pub fn resolve_symbol(spec: &LibrarySpec, name: &str) -> Result<ResolveReport> {
    let lib = spec.open()?;
    let (address, lookup) = lib.resolve_detailed(name)?;
    let (resolution, mangled) = match lookup {
        Lookup::Direct => (Resolution::Direct, None),
        Lookup::Demangled(raw) => (Resolution::Demangled, Some(raw)),
    };
    let offset = lib
        .base_address()
        .ok()
        .and_then(|base| address.addr().checked_sub(base))
        .map(|off| off as u64);
    Ok(ResolveReport {
        library: spec.path(),
        symbol: name.to_string(),
        resolution,
        mangled,
        address: hex(address.addr()),
        offset,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetReport {
    pub library: String,
    pub offset: u64,
    pub address: String,
    pub checked: bool,
    /// Raw name of the symbol at the address, for checked lookups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

pub fn resolve_offset(spec: &LibrarySpec, offset: u64, checked: bool) -> Result<OffsetReport> {
    let signed = isize::try_from(offset)
        .map_err(|_| HarnessError::Usage(format!("offset {offset:#x} is out of range")))?;
    let lib = spec.open()?;
    let (address, symbol) = if checked {
        let found = lib.resolve_at_checked(signed)?;
        (found.addr(), symbol_at(&lib, found)?)
    } else {
        (lib.resolve_at(signed)?.addr(), None)
    };
    Ok(OffsetReport {
        library: spec.path(),
        offset,
        address: hex(address),
        checked,
        symbol,
    })
}

/// First loadable raw name that resolves to `address`.
fn symbol_at(lib: &Library, address: SymbolAddress) -> Result<Option<String>> {
    Ok(lib
        .symbols(SymbolParams::new().loadable(true))?
        .into_iter()
        .find(|name| lib.resolve(name).is_ok_and(|a| a == address)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_composes_path() {
        let spec = LibrarySpec::new("/opt/plugins", "adder", true);
        let expected = format!(
            "/opt/plugins/{}",
            dynload::FILENAME_COMPONENTS.decorate("adder")
        );
        assert_eq!(spec.path(), expected);
        assert_eq!(LibrarySpec::new("", "x.bin", false).path(), "x.bin");
    }

    #[test]
    fn fingerprint_of_known_bytes() {
        let path = std::env::temp_dir().join(format!("dynload-fp-{}", std::process::id()));
        std::fs::write(&path, b"abc").unwrap();
        let fp = fingerprint(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(
            fp.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fp.size_bytes, 3);
    }

    #[test]
    fn fingerprint_missing_file() {
        assert!(fingerprint(Path::new("/nonexistent/dynload/lib.so")).is_none());
    }

    #[test]
    fn missing_library_maps_to_load_error() {
        let err = resolve_symbol(&LibrarySpec::new("/nonexistent", "none", true), "f")
            .unwrap_err();
        assert_eq!(err.kind(), "load");
        assert_eq!(err.exit_code(), crate::error::EXIT_FAILURE);
    }

    #[test]
    fn resolution_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Resolution::Demangled).unwrap(),
            "\"demangled\""
        );
    }
}
