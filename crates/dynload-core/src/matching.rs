//! Demangled-name matching for the symbol lookup fallback.
//!
//! When a name cannot be resolved directly, every symbol in the library is
//! demangled and compared against the request. A demangled name matches when
//! it starts with the requested text and the next character is either `(`
//! (the start of a call signature) or the end of the string.

/// Returns `true` if `demangled` names the entity `requested`.
///
/// `"add(int, int)"` and `"add"` match `"add"`; `"adder(int)"` and
/// `"add<int>(int)"` do not.
#[inline]
pub fn matches_demangled(demangled: &str, requested: &str) -> bool {
    match demangled.strip_prefix(requested) {
        Some(rest) => rest.is_empty() || rest.starts_with('('),
        None => false,
    }
}

/// Result of scanning a symbol list for one requested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome<'a> {
    /// No demangled symbol matched.
    None,
    /// Exactly one raw symbol matched.
    Unique(&'a str),
    /// Several raw symbols matched; their raw names are kept for diagnostics.
    Ambiguous(Vec<&'a str>),
}

impl<'a> MatchOutcome<'a> {
    /// Scan `symbols` (raw names) for entries whose demangled form matches
    /// `requested`. Names `demangle` rejects are skipped.
    pub fn scan<I, F>(symbols: I, requested: &str, mut demangle: F) -> Self
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&str) -> Option<String>,
    {
        let mut matched = Vec::new();
        for raw in symbols {
            let Some(demangled) = demangle(raw) else {
                continue;
            };
            if demangled.is_empty() {
                continue;
            }
            if matches_demangled(&demangled, requested) {
                matched.push(raw);
            }
        }
        Self::from_matches(matched)
    }

    /// Classify an already collected list of matching raw names.
    pub fn from_matches(mut matched: Vec<&'a str>) -> Self {
        match matched.len() {
            0 => Self::None,
            1 => Self::Unique(matched.remove(0)),
            _ => Self::Ambiguous(matched),
        }
    }

    /// Number of matching symbols.
    pub fn count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Unique(_) => 1,
            Self::Ambiguous(v) => v.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(raw: &str) -> Option<String> {
        match raw {
            "_Z3addii" => Some("add(int, int)".into()),
            "_Z1fi" => Some("f(int)".into()),
            "_Z1fd" => Some("f(double)".into()),
            "_Z5adderv" => Some("adder()".into()),
            "_ZN4math2piE" => Some("math::pi".into()),
            "_ZL5emptyv" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn prefix_then_paren_or_end() {
        assert!(matches_demangled("add(int, int)", "add"));
        assert!(matches_demangled("math::pi", "math::pi"));
        assert!(!matches_demangled("adder()", "add"));
        assert!(!matches_demangled("add<int>(int)", "add"));
        assert!(!matches_demangled("ad", "add"));
    }

    #[test]
    fn unique_match() {
        let syms = ["_Z3addii", "_Z5adderv", "plain"];
        let out = MatchOutcome::scan(syms.iter().copied(), "add", table);
        assert_eq!(out, MatchOutcome::Unique("_Z3addii"));
    }

    #[test]
    fn overloads_are_ambiguous() {
        let syms = ["_Z1fi", "_Z1fd", "_Z3addii"];
        let out = MatchOutcome::scan(syms.iter().copied(), "f", table);
        assert_eq!(out, MatchOutcome::Ambiguous(vec!["_Z1fi", "_Z1fd"]));
        assert_eq!(out.count(), 2);
    }

    #[test]
    fn undemanglable_names_are_skipped() {
        // "plain" fails to demangle and "_ZL5emptyv" demangles to nothing;
        // neither may count as a match even for an empty request.
        let syms = ["plain", "_ZL5emptyv"];
        let out = MatchOutcome::scan(syms.iter().copied(), "", table);
        assert_eq!(out, MatchOutcome::None);
    }

    #[test]
    fn qualified_names_match_exactly() {
        let syms = ["_ZN4math2piE"];
        assert_eq!(
            MatchOutcome::scan(syms.iter().copied(), "math::pi", table),
            MatchOutcome::Unique("_ZN4math2piE")
        );
        assert_eq!(
            MatchOutcome::scan(syms.iter().copied(), "pi", table),
            MatchOutcome::None
        );
    }
}
