//! Runtime configuration.
//!
//! The offset-resolution mode is set via the `DYNLOAD_OFFSET_MODE` environment
//! variable:
//! - `unchecked` (default): `resolve_at` returns `base + offset` without
//!   looking at the symbol table. Callers own the correctness of the address.
//! - `validated`: the computed address must equal the address of some
//!   loadable symbol, otherwise resolution fails.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted by [`offset_mode`].
pub const OFFSET_MODE_ENV: &str = "DYNLOAD_OFFSET_MODE";

/// How offset-based resolution treats the computed address.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetMode {
    /// Return `base + offset` as-is.
    #[default]
    Unchecked,
    /// Cross-check `base + offset` against enumerated symbol addresses.
    Validated,
}

impl OffsetMode {
    /// Parse from string (case-insensitive). Unknown values map to
    /// [`OffsetMode::Unchecked`].
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "validated" | "validate" | "checked" | "strict" => Self::Validated,
            _ => Self::Unchecked,
        }
    }

    /// Returns true if offsets must be matched against the symbol table.
    #[must_use]
    pub const fn validates(self) -> bool {
        matches!(self, Self::Validated)
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::Validated => "validated",
        }
    }
}

static ENV_MODE: OnceLock<OffsetMode> = OnceLock::new();

// Set by `set_offset_mode`; takes precedence over the environment.
static OVERRIDE: AtomicU8 = AtomicU8::new(NO_OVERRIDE);

const NO_OVERRIDE: u8 = 0;
const MODE_UNCHECKED: u8 = 1;
const MODE_VALIDATED: u8 = 2;

fn mode_to_u8(mode: OffsetMode) -> u8 {
    match mode {
        OffsetMode::Unchecked => MODE_UNCHECKED,
        OffsetMode::Validated => MODE_VALIDATED,
    }
}

fn override_from_u8(v: u8) -> Option<OffsetMode> {
    match v {
        MODE_UNCHECKED => Some(OffsetMode::Unchecked),
        MODE_VALIDATED => Some(OffsetMode::Validated),
        _ => None,
    }
}

/// Parse the environment value once into `cell`. Threads arriving while
/// another one is reading block until the value is stored.
fn cached_mode(
    cell: &OnceLock<OffsetMode>,
    read: impl FnOnce() -> Option<String>,
) -> OffsetMode {
    *cell.get_or_init(|| {
        read()
            .map(|v| OffsetMode::from_str_loose(&v))
            .unwrap_or_default()
    })
}

/// Get the configured offset mode.
///
/// An override from [`set_offset_mode`] wins; otherwise the environment is
/// read on first call and cached for the life of the process.
#[must_use]
pub fn offset_mode() -> OffsetMode {
    override_from_u8(OVERRIDE.load(Ordering::Acquire)).unwrap_or_else(|| {
        cached_mode(&ENV_MODE, || std::env::var(OFFSET_MODE_ENV).ok())
    })
}

/// Override the offset mode for the whole process, ignoring the environment.
pub fn set_offset_mode(mode: OffsetMode) {
    OVERRIDE.store(mode_to_u8(mode), Ordering::Release);
}
