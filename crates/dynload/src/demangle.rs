//! Human-readable names for raw linker symbols.
//!
//! Itanium C++ names (`_Z...`) go through `cpp_demangle`; Rust v0 (`_R...`)
//! and legacy Rust names go through `rustc-demangle`. Names neither
//! demangler accepts yield `None`, which callers treat as "skip this symbol".

use cpp_demangle::{DemangleOptions, Symbol};

/// Demangle `raw`, or `None` if it is not a mangled name we understand.
///
/// Plain C names such as `cos` are not mangled and return `None`.
pub fn demangle(raw: &str) -> Option<String> {
    let demangled = if raw.starts_with("_R") || is_rust_legacy(raw) {
        rust(raw)
    } else if raw.starts_with("_Z") {
        itanium(raw).or_else(|| rust(raw))
    } else {
        None
    }?;
    (!demangled.is_empty()).then_some(demangled)
}

/// Legacy Rust symbols are valid Itanium names ending in a `17h<hash>E`
/// path element; the Itanium demangler would keep the hash.
fn is_rust_legacy(raw: &str) -> bool {
    let Some(body) = raw.strip_prefix("_ZN").and_then(|s| s.strip_suffix('E')) else {
        return false;
    };
    body.len() >= 19
        && body.is_char_boundary(body.len() - 19)
        && body[body.len() - 19..]
            .strip_prefix("17h")
            .is_some_and(|hash| hash.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// `_Z` names only; `cpp_demangle` also parses bare types (`i` is `int`).
fn itanium(raw: &str) -> Option<String> {
    let symbol = Symbol::new(raw).ok()?;
    symbol.demangle(&DemangleOptions::default()).ok()
}

fn rust(raw: &str) -> Option<String> {
    // `{:#}` drops the trailing hash of legacy symbols.
    rustc_demangle::try_demangle(raw)
        .ok()
        .map(|d| format!("{d:#}"))
}
