//! Platform filename decoration and library path composition.

/// Prefix/suffix pair wrapped around a logical library name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilenameComponents {
    pub prefix: &'static str,
    pub suffix: &'static str,
}

impl FilenameComponents {
    /// Wrap `name` with this prefix and suffix.
    pub fn decorate(&self, name: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + name.len() + self.suffix.len());
        out.push_str(self.prefix);
        out.push_str(name);
        out.push_str(self.suffix);
        out
    }
}

#[cfg(windows)]
pub const FILENAME_COMPONENTS: FilenameComponents = FilenameComponents {
    prefix: "",
    suffix: ".dll",
};

#[cfg(target_vendor = "apple")]
pub const FILENAME_COMPONENTS: FilenameComponents = FilenameComponents {
    prefix: "lib",
    suffix: ".dylib",
};

#[cfg(not(any(windows, target_vendor = "apple")))]
pub const FILENAME_COMPONENTS: FilenameComponents = FilenameComponents {
    prefix: "lib",
    suffix: ".so",
};

/// Returns `true` if `c` terminates a directory component on this platform.
#[inline]
fn is_separator(c: char) -> bool {
    c == '/' || (cfg!(windows) && c == '\\')
}

/// Build the path handed to the platform loader.
///
/// A `/` is inserted between `dir` and the file name unless `dir` is empty
/// or already ends with a separator. With `decorations`, the name is wrapped
/// with [`FILENAME_COMPONENTS`].
pub fn compose_path(dir: &str, name: &str, decorations: bool) -> String {
    compose_path_with(dir, name, decorations.then_some(&FILENAME_COMPONENTS))
}

/// Same as [`compose_path`] with an explicit decoration table.
pub fn compose_path_with(
    dir: &str,
    name: &str,
    components: Option<&FilenameComponents>,
) -> String {
    let file_name = match components {
        Some(c) => c.decorate(name),
        None => name.to_string(),
    };

    let mut path = String::with_capacity(dir.len() + 1 + file_name.len());
    path.push_str(dir);
    if !dir.is_empty() && !dir.ends_with(is_separator) {
        path.push('/');
    }
    path.push_str(&file_name);
    path
}
