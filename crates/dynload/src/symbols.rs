//! Listing options and the filter applied to raw symbol names.

/// Options for [`crate::Library::symbols`].
///
/// ```
/// use dynload::SymbolParams;
///
/// let params = SymbolParams::new().demangle(true).loadable(true);
/// assert!(params.demangle && params.loadable);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolParams {
    /// Report demangled names; names that do not demangle are dropped.
    pub demangle: bool,
    /// Report only names the loader can actually resolve.
    pub loadable: bool,
}

impl SymbolParams {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            demangle: false,
            loadable: false,
        }
    }

    #[must_use]
    pub const fn demangle(mut self, on: bool) -> Self {
        self.demangle = on;
        self
    }

    #[must_use]
    pub const fn loadable(mut self, on: bool) -> Self {
        self.loadable = on;
        self
    }
}

/// Apply `params` to `raw`, preserving order.
///
/// The loadability test always sees the raw name, even when the output is
/// demangled.
pub(crate) fn filter<L, D>(
    raw: Vec<String>,
    params: SymbolParams,
    mut is_loadable: L,
    mut demangle: D,
) -> Vec<String>
where
    L: FnMut(&str) -> bool,
    D: FnMut(&str) -> Option<String>,
{
    raw.into_iter()
        .filter(|name| !params.loadable || is_loadable(name))
        .filter_map(|name| {
            if params.demangle {
                demangle(&name)
            } else {
                Some(name)
            }
        })
        .collect()
}
