//! Integration test: symbol-table readers against real system libraries.
//!
//! Validates ELF symbol enumeration on installed shared objects. Tests
//! skip when the expected files are not present on the host.
//!
//! Run: cargo test -p dynload-core --test object_symbols_test

use dynload_core::symbol_names;
use object::FileKind;
use std::fs;

fn read_first(paths: &[&str]) -> Option<Vec<u8>> {
    paths.iter().find_map(|p| fs::read(p).ok())
}

const LIBC_PATHS: &[&str] = &[
    "/lib/x86_64-linux-gnu/libc.so.6",
    "/lib/aarch64-linux-gnu/libc.so.6",
    "/lib64/libc.so.6",
    "/usr/lib/x86_64-linux-gnu/libc.so.6",
    "/usr/lib64/libc.so.6",
];

const LIBM_PATHS: &[&str] = &[
    "/lib/x86_64-linux-gnu/libm.so.6",
    "/lib/aarch64-linux-gnu/libm.so.6",
    "/lib64/libm.so.6",
    "/usr/lib/x86_64-linux-gnu/libm.so.6",
    "/usr/lib64/libm.so.6",
];

#[test]
fn system_libc_exports_core_functions() {
    let Some(data) = read_first(LIBC_PATHS) else {
        eprintln!("Skipping: no libc.so.6 found in standard paths");
        return;
    };
    assert!(matches!(
        FileKind::parse(&*data),
        Ok(FileKind::Elf32 | FileKind::Elf64)
    ));

    let names = symbol_names(&data).expect("failed to read libc.so.6 symbols");
    eprintln!("libc.so.6: {} symbols", names.len());
    assert!(names.len() > 1000, "libc should export many symbols");
    for expected in ["malloc", "free", "memcpy", "strlen", "printf"] {
        assert!(
            names.iter().any(|n| n == expected),
            "libc.so.6 should define {expected}"
        );
    }
}

#[test]
fn system_libm_exports_cos() {
    let Some(data) = read_first(LIBM_PATHS) else {
        eprintln!("Skipping: no libm.so.6 found in standard paths");
        return;
    };
    let names = symbol_names(&data).expect("failed to read libm.so.6 symbols");
    assert!(names.iter().any(|n| n == "cos"));
    assert!(names.iter().any(|n| n == "sqrt"));
}

#[test]
fn names_are_unique_and_non_empty() {
    let Some(data) = read_first(LIBC_PATHS) else {
        eprintln!("Skipping: no libc.so.6 found in standard paths");
        return;
    };
    let names = symbol_names(&data).unwrap();
    let mut sorted = names.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), names.len(), "duplicate names reported");
    assert!(names.iter().all(|n| !n.is_empty()));
}

#[test]
fn undefined_imports_are_not_reported() {
    let Some(data) = read_first(LIBM_PATHS) else {
        eprintln!("Skipping: no libm.so.6 found in standard paths");
        return;
    };
    // libm imports but does not define these.
    let names = symbol_names(&data).unwrap();
    for import in ["__cxa_finalize", "_ITM_registerTMCloneTable"] {
        assert!(
            !names.iter().any(|n| n == import),
            "{import} is an import of libm, not an export"
        );
    }
}
