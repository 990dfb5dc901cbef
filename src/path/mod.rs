//! Path helpers for the `/`-delimited namespace.
//!
//! An absolute path starts with `/`, has no empty segments and no trailing
//! slash, except for the root path `/` itself. A sub-path follows the same
//! rules but may omit the leading `/`, which makes it usable as the relative
//! half of [`join`].


use crate::constants::PATH_SEPARATOR;
use crate::constants::ROOT_PATH;
use crate::Error;
use crate::Result;

/// Checks `path` against the namespace grammar.
///
/// With `allow_sub_path` set, a path lacking the leading `/` is accepted under
/// the same segment rules.
pub fn is_valid_path(
    path: &str,
    allow_sub_path: bool,
) -> bool {
    check(path, allow_sub_path).is_ok()
}

/// Absolute form of [`is_valid_path`]
pub fn is_valid_absolute_path(path: &str) -> bool {
    is_valid_path(path, false)
}

/// Sub-path form of [`is_valid_path`]
pub fn is_valid_sub_path(path: &str) -> bool {
    is_valid_path(path, true)
}

/// Same rules as [`is_valid_absolute_path`], reporting why a path is rejected.
pub fn validate_path(path: &str) -> Result<()> {
    check(path, false).map_err(|reason| Error::InvalidPath {
        path: path.to_string(),
        reason,
    })
}

fn check(
    path: &str,
    allow_sub_path: bool,
) -> std::result::Result<(), &'static str> {
    if path.is_empty() {
        return Err("path is empty");
    }
    if path == ROOT_PATH {
        return Ok(());
    }

    let rest = match path.strip_prefix(PATH_SEPARATOR) {
        Some(rest) => rest,
        None if allow_sub_path => path,
        None => return Err("path must start with '/'"),
    };

    if rest.ends_with(PATH_SEPARATOR) {
        return Err("path must not end with '/'");
    }
    if rest.split(PATH_SEPARATOR).any(str::is_empty) {
        return Err("path must not contain empty segments");
    }
    Ok(())
}

/// Parent of an absolute path; `None` for the root.
pub fn get_parent(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some(ROOT_PATH),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Final segment of a path (empty for the root).
pub fn node_name(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Appends a sub-path to `parent`.
pub fn join(
    parent: &str,
    child: &str,
) -> String {
    let child = child.trim_start_matches(PATH_SEPARATOR);
    if parent == ROOT_PATH {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Strict ancestors of `path` excluding the root, shallowest first.
///
/// `/a/b/c` yields `["/a", "/a/b"]`.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = path;
    while let Some(parent) = get_parent(current) {
        if parent == ROOT_PATH {
            break;
        }
        result.push(parent.to_string());
        current = parent;
    }
    result.reverse();
    result
}
