//! Integration test: loading the system math library through the native loader.
//!
//! Validates open, raw lookup, enumeration and base-relative addressing
//! against libm. Tests skip when libm cannot be located.
//!
//! Run: cargo test -p dynload --test system_library_test

#![cfg(unix)]

use std::collections::HashSet;
use std::path::Path;

use dynload::{ErrorKind, Library, SymbolParams};

/// Directory and undecorated name of the system libm.
fn libm_location() -> Option<(&'static str, &'static str)> {
    if cfg!(target_vendor = "apple") {
        return Some(("/usr/lib", "m"));
    }
    const DIRS: &[&str] = &[
        "/lib/x86_64-linux-gnu",
        "/lib/aarch64-linux-gnu",
        "/usr/lib/x86_64-linux-gnu",
        "/usr/lib/aarch64-linux-gnu",
        "/lib64",
        "/usr/lib64",
        "/usr/lib",
        "/lib",
    ];
    DIRS.iter()
        .find(|dir| Path::new(dir).join("libm.so.6").exists())
        .map(|dir| (*dir, "libm.so.6"))
}

fn open_libm() -> Option<Library> {
    let Some((dir, name)) = libm_location() else {
        eprintln!("Skipping: libm not found in standard paths");
        return None;
    };
    let decorate = cfg!(target_vendor = "apple");
    match unsafe { Library::open(dir, name, decorate) } {
        Ok(lib) => Some(lib),
        // Recent macOS serves libm from the dyld shared cache with no file on disk.
        Err(e) if cfg!(target_vendor = "apple") => {
            eprintln!("Skipping: {e}");
            None
        }
        Err(e) => panic!("libm should load: {e}"),
    }
}

#[test]
fn cos_resolves_and_is_callable() {
    let Some(lib) = open_libm() else { return };
    assert!(lib.has_symbol("cos"));
    let cos = unsafe { lib.get::<extern "C" fn(f64) -> f64>("cos") }.unwrap();
    assert_eq!(cos(0.0), 1.0);
    assert!((cos(std::f64::consts::PI) + 1.0).abs() < 1e-12);
}

#[test]
fn missing_symbol_is_symbol_error() {
    let Some(lib) = open_libm() else { return };
    assert!(!lib.has_symbol("definitely_not_in_libm"));
    let err = lib.resolve("definitely_not_in_libm").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Symbol);
    assert!(
        err.to_string()
            .starts_with("Could not get symbol 'definitely_not_in_libm'\n"),
        "{err}"
    );
}

#[test]
fn symbols_include_cos() {
    let Some(lib) = open_libm() else { return };
    let all = lib.symbols(SymbolParams::new()).unwrap();
    assert!(all.iter().any(|s| s == "cos"));

    let loadable = lib.symbols(SymbolParams::new().loadable(true)).unwrap();
    assert!(loadable.iter().any(|s| s == "cos"));
    let listed: HashSet<&str> = all.iter().map(String::as_str).collect();
    let strays: Vec<&String> = loadable
        .iter()
        .filter(|s| !listed.contains(s.as_str()))
        .collect();
    assert!(
        strays.is_empty(),
        "loadable names missing from the raw listing: {strays:?}"
    );

    // libm is plain C; nothing demangles.
    let demangled = lib.symbols(SymbolParams::new().demangle(true)).unwrap();
    assert!(!demangled.iter().any(|s| s == "cos"));
}

#[test]
fn offset_zero_is_the_load_base() {
    let Some(lib) = open_libm() else { return };
    let cos = lib.resolve("cos").unwrap();

    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::dladdr(cos.as_ptr().cast_const(), &mut info) };
    assert_ne!(rc, 0, "dladdr should know cos");

    let base = info.dli_fbase as usize;
    assert_eq!(lib.base_address().unwrap(), base);
    assert_eq!(lib.resolve_at(0).unwrap().addr(), base);

    let offset = (cos.addr() - base) as isize;
    assert_eq!(lib.resolve_at(offset).unwrap().addr(), cos.addr());
}

#[test]
fn checked_offset_finds_cos() {
    let Some(lib) = open_libm() else { return };
    let cos = lib.resolve("cos").unwrap();
    let base = lib.base_address().unwrap();
    let found = lib
        .resolve_at_checked((cos.addr() - base) as isize)
        .unwrap();
    assert_eq!(found.addr(), cos.addr());
    assert_eq!(lib.resolve_at_checked(1).unwrap_err().kind(), ErrorKind::Symbol);
}

#[test]
fn missing_library_is_load_error() {
    let err = unsafe { Library::open("/nonexistent/dynload", "nothing", true) }.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.to_string().starts_with("Could not load library '/nonexistent/dynload/"));
}

#[test]
fn two_instances_share_one_loaded_image() {
    let Some(first) = open_libm() else { return };
    let Some(second) = open_libm() else { return };
    let a = first.resolve("cos").unwrap();
    drop(first);
    let b = second.resolve("cos").unwrap();
    assert_eq!(a, b);
}
