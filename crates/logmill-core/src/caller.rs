//! Call-site resolution
//!
//! The location is captured where the public logging API is invoked, either
//! by the logging macros (`file!()`, `line!()` and the enclosing function's
//! path) or by `#[track_caller]` methods, and then normalized here.

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// File whose presence marks a project root
pub const PROJECT_MARKER: &str = "Cargo.toml";

/// Name of the probe function generated by [`source_location!`](crate::source_location)
#[doc(hidden)]
pub const PROBE_FN: &str = "__logmill_probe";

static PROJECT_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Raw location as captured at the call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    /// Fully qualified function path, empty when unknown
    pub function: &'static str,
}

impl SourceLocation {
    pub const fn new(file: &'static str, line: u32, function: &'static str) -> Self {
        Self {
            file,
            line,
            function,
        }
    }

    /// Location of the caller of the `#[track_caller]` chain; the function is unknown
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        Self::new(loc.file(), loc.line(), "")
    }

    /// Normalize into the fields written to the event
    pub fn resolve(&self) -> CallerInfo {
        CallerInfo {
            file: trim_file_path(self.file),
            line: self.line,
            function: trim_function_name(self.function),
        }
    }
}

/// Caller fields written to each event (`file`, `line`, `func`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerInfo {
    pub file: String,
    pub line: u32,
    pub function: String,
}

/// Capture the current source location including the enclosing function
#[macro_export]
macro_rules! source_location {
    () => {{
        fn __logmill_probe() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::caller::SourceLocation::new(file!(), line!(), __type_name_of(__logmill_probe))
    }};
}

/// Make a source path project-relative.
///
/// Relative paths are already relative to the build root and are kept.
/// Absolute paths are made relative to the nearest ancestor containing
/// [`PROJECT_MARKER`]; the first root found is cached for the process.
/// When no root applies only the base name is kept.
pub fn trim_file_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let p = Path::new(path);
    if p.is_relative() {
        return path.to_string();
    }
    relative_to_root(project_root(p), p)
}

fn project_root(file: &Path) -> Option<&'static Path> {
    if let Some(root) = PROJECT_ROOT.get() {
        return Some(root.as_path());
    }
    let found = find_project_root(file)?;
    debug!(root = %found.display(), "Project root for caller paths");
    Some(PROJECT_ROOT.get_or_init(|| found).as_path())
}

fn relative_to_root(root: Option<&Path>, file: &Path) -> String {
    if let Some(rel) = root.and_then(|r| file.strip_prefix(r).ok()) {
        return rel.to_string_lossy().into_owned();
    }
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Walk parent directories of `file` looking for [`PROJECT_MARKER`]
pub fn find_project_root(file: &Path) -> Option<PathBuf> {
    file.ancestors()
        .skip(1)
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
}

/// Reduce a function path to its bare identifier.
///
/// `app::svc::Server::serve` becomes `serve`; closure segments and the
/// macro probe are dropped; generic arguments and `<T as Trait>` prefixes
/// are treated as single segments.
pub fn trim_function_name(name: &str) -> String {
    let segments = split_path(name);
    segments
        .into_iter()
        .rev()
        .find(|s| !s.is_empty() && *s != PROBE_FN && !s.starts_with("{{"))
        .map(strip_generics)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn split_path(name: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let bytes = name.as_bytes();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                segments.push(&name[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(&name[start..]);
    segments
}

fn strip_generics(segment: &str) -> &str {
    match segment.find('<') {
        Some(0) => segment,
        Some(idx) => &segment[..idx],
        None => segment,
    }
}
