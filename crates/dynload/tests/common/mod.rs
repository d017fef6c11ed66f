//! Shared fixtures: an in-memory loader and on-demand compiled libraries.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::ptr::NonNull;
use std::sync::Arc;

use dynload::{NativeHandle, Platform};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Fake platform
// ---------------------------------------------------------------------------

pub const FAKE_BASE: usize = 0x7f00_0000_0000;

/// Calls observed by a [`FakePlatform`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Ledger {
    pub opened: Vec<String>,
    pub closed: usize,
    pub files_opened: usize,
    pub files_closed: usize,
    pub enumerations: usize,
    pub lookups: Vec<String>,
}

/// One library image known to the fake loader.
#[derive(Debug, Clone, Default)]
pub struct FakeImage {
    /// Raw symbol name to offset from the base; `None` marks a symbol the
    /// loader refuses to resolve.
    pub symbols: Vec<(String, Option<usize>)>,
    pub file_error: Option<String>,
    pub reader_error: Option<String>,
    pub close_error: Option<String>,
}

impl FakeImage {
    pub fn with_symbols(symbols: &[(&str, Option<usize>)]) -> Self {
        Self {
            symbols: symbols
                .iter()
                .map(|&(name, offset)| (name.to_string(), offset))
                .collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    ledger: Ledger,
    last_error: Option<String>,
}

/// Loader that serves [`FakeImage`]s by path and records every call.
#[derive(Debug, Clone, Default)]
pub struct FakePlatform {
    images: Arc<HashMap<String, FakeImage>>,
    state: Arc<Mutex<FakeState>>,
}

impl FakePlatform {
    pub fn new<S: Into<String>>(images: impl IntoIterator<Item = (S, FakeImage)>) -> Self {
        Self {
            images: Arc::new(
                images
                    .into_iter()
                    .map(|(path, image)| (path.into(), image))
                    .collect(),
            ),
            state: Arc::default(),
        }
    }

    pub fn ledger(&self) -> Ledger {
        self.state.lock().ledger.clone()
    }

    fn image(&self, handle: NativeHandle) -> &FakeImage {
        let index = handle.addr() - FAKE_BASE;
        let mut paths: Vec<&String> = self.images.keys().collect();
        paths.sort();
        &self.images[paths[index / 0x1_0000]]
    }

    fn base_of(&self, path: &str) -> Option<usize> {
        let mut paths: Vec<&String> = self.images.keys().collect();
        paths.sort();
        let index = paths.iter().position(|p| *p == path)?;
        Some(FAKE_BASE + index * 0x1_0000)
    }

    fn fail(&self, msg: String) {
        self.state.lock().last_error = Some(msg);
    }
}

/// Backing file whose drop is counted.
#[derive(Debug)]
pub struct FakeFile {
    state: Arc<Mutex<FakeState>>,
}

impl Drop for FakeFile {
    fn drop(&mut self) {
        self.state.lock().ledger.files_closed += 1;
    }
}

impl Platform for FakePlatform {
    type File = FakeFile;

    unsafe fn open(&self, path: &CStr) -> Option<NativeHandle> {
        let path = path.to_string_lossy().into_owned();
        self.state.lock().ledger.opened.push(path.clone());
        match self.base_of(&path) {
            Some(base) => NonNull::new(base as *mut c_void).map(NativeHandle::new),
            None => {
                self.fail(format!("{path}: cannot open shared object file"));
                None
            }
        }
    }

    unsafe fn resolve(&self, handle: NativeHandle, name: &CStr) -> Option<NonNull<c_void>> {
        let name = name.to_string_lossy().into_owned();
        self.state.lock().ledger.lookups.push(name.clone());
        let found = self
            .image(handle)
            .symbols
            .iter()
            .find(|(raw, _)| *raw == name)
            .and_then(|(_, offset)| *offset);
        match found {
            Some(offset) => NonNull::new((handle.addr() + offset) as *mut c_void),
            None => {
                self.fail(format!("undefined symbol: {name}"));
                None
            }
        }
    }

    unsafe fn close(&self, handle: NativeHandle) -> Result<(), String> {
        self.state.lock().ledger.closed += 1;
        match &self.image(handle).close_error {
            Some(msg) => Err(msg.clone()),
            None => Ok(()),
        }
    }

    fn last_error(&self) -> String {
        self.state
            .lock()
            .last_error
            .take()
            .unwrap_or_else(|| "Unknown error (fake)".to_string())
    }

    unsafe fn base_address(&self, handle: NativeHandle) -> Option<usize> {
        Some(handle.addr())
    }

    fn open_file(&self, path: &CStr) -> Result<Option<FakeFile>, String> {
        let path = path.to_string_lossy();
        if let Some(msg) = self.images.get(path.as_ref()).and_then(|i| i.file_error.clone()) {
            return Err(msg);
        }
        self.state.lock().ledger.files_opened += 1;
        Ok(Some(FakeFile {
            state: Arc::clone(&self.state),
        }))
    }

    unsafe fn raw_symbols(
        &self,
        handle: NativeHandle,
        file: Option<&FakeFile>,
    ) -> Result<Vec<String>, String> {
        assert!(file.is_some(), "enumeration without an open file");
        self.state.lock().ledger.enumerations += 1;
        let image = self.image(handle);
        if let Some(msg) = &image.reader_error {
            return Err(msg.clone());
        }
        Ok(image.symbols.iter().map(|(raw, _)| raw.clone()).collect())
    }
}

// ---------------------------------------------------------------------------
// Compiled fixtures
// ---------------------------------------------------------------------------

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Fresh scratch directory under the system temp dir.
pub fn temp_dir(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!(
        "dynload-{label}-{}-{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Compile `source` from the fixtures directory into `out_dir/lib<name>.so`
/// (or `.dylib`). Returns `None` when no compiler is available.
#[cfg(unix)]
pub fn build_fixture(source: &str, name: &str, out_dir: &Path) -> Option<PathBuf> {
    let cxx = source.ends_with(".cpp");
    let compiler = if cxx {
        std::env::var("CXX").unwrap_or_else(|_| "c++".to_string())
    } else {
        std::env::var("CC").unwrap_or_else(|_| "cc".to_string())
    };
    let output = out_dir.join(dynload::FILENAME_COMPONENTS.decorate(name));
    let mut cmd = Command::new(&compiler);
    cmd.arg("-shared").arg("-fPIC").arg("-O1");
    if cfg!(target_vendor = "apple") {
        cmd.arg("-dynamiclib");
    }
    cmd.arg("-o").arg(&output).arg(fixtures_dir().join(source));

    match cmd.output() {
        Ok(out) if out.status.success() => Some(output),
        Ok(out) => {
            eprintln!(
                "Skipping: {compiler} failed on {source}: {}",
                String::from_utf8_lossy(&out.stderr)
            );
            None
        }
        Err(e) => {
            eprintln!("Skipping: {compiler} not available ({e})");
            None
        }
    }
}
