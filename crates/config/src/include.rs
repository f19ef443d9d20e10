//! Body `!include` resolution.
//!
//! A monitor body of `!include <relative_path>` is replaced at load time
//! with the contents of `<config_dir>/data/<relative_path>`. The path is
//! normalized lexically and must stay inside the `data/` sandbox.

use std::path::{Component, Path, PathBuf};

/// Prefix marking a body as an include directive.
pub const INCLUDE_PREFIX: &str = "!include ";

/// Return the include path when `body` is an include directive.
#[must_use]
pub fn include_path(body: &str) -> Option<&str> {
    body.strip_prefix(INCLUDE_PREFIX).map(str::trim)
}

/// Resolve an include path against the config sandbox.
///
/// Rejects absolute paths and any path whose lexical normalization escapes
/// `<config_dir>/data/`. Returns the file contents.
pub fn resolve_include(config_dir: &Path, rel_path: &str) -> Result<String, String> {
    let rel = Path::new(rel_path);
    if rel.is_absolute() {
        return Err("absolute paths are not allowed".into());
    }

    // Lexical normalization: refuse any traversal that would climb out of
    // the data/ directory, without touching the filesystem.
    let mut normalized = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err("path escapes the data/ sandbox".into());
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err("absolute paths are not allowed".into());
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err("path resolves to the sandbox root".into());
    }

    let full = config_dir.join("data").join(&normalized);
    std::fs::read_to_string(&full).map_err(|e| format!("read {}: {e}", full.display()))
}
