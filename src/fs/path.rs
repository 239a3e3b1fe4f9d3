//! Path helpers shared by the resolver and the filesystem facade.

use crate::error::{DriveError, Result};

/// Normalize a path: leading `/`, no trailing `/`, no empty or `.` segments.
///
/// `..` pops a segment and stops at the root, so a normalized path never
/// escapes `/`.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Map a client path below `root_dir`.
pub(crate) fn with_root(root_dir: &str, path: &str) -> String {
    let root = normalize_path(root_dir);
    let path = normalize_path(path);
    if root == "/" {
        path
    } else if path == "/" {
        root
    } else {
        format!("{}{}", root, path)
    }
}

/// Split a normalized path into parent path and final name.
///
/// The root splits into `("/", "")`.
pub(crate) fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("/", path),
    }
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// True if `path` is `prefix` or lies below it.
pub(crate) fn is_within(path: &str, prefix: &str) -> bool {
    prefix == "/"
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// Reject names the drive cannot hold or that are hidden from clients.
///
/// Dot-files are refused outright: desktop clients probe for them constantly
/// and they would otherwise turn into remote lookups.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DriveError::InvalidArgument("empty file name".to_string()));
    }
    if name.starts_with('.') {
        return Err(DriveError::InvalidArgument(format!(
            "hidden file names are not allowed: {}",
            name
        )));
    }
    if name.contains('/') {
        return Err(DriveError::InvalidArgument(format!("invalid file name: {}", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/foo"), "/foo");
        assert_eq!(normalize_path("/foo/"), "/foo");
        assert_eq!(normalize_path("/foo//bar"), "/foo/bar");
        assert_eq!(normalize_path("foo"), "/foo");
        assert_eq!(normalize_path("/foo/./bar/../baz"), "/foo/baz");
        assert_eq!(normalize_path("/../.."), "/");
    }

    #[test]
    fn test_with_root() {
        assert_eq!(with_root("/", "/a/b"), "/a/b");
        assert_eq!(with_root("/media", "/"), "/media");
        assert_eq!(with_root("/media/", "a"), "/media/a");
        assert_eq!(with_root("/media", "/../etc"), "/media/etc");
    }

    #[test]
    fn test_split_and_join() {
        assert_eq!(split_path("/"), ("/", ""));
        assert_eq!(split_path("/a"), ("/", "a"));
        assert_eq!(split_path("/a/b/c"), ("/a/b", "c"));
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a/b", "c"), "/a/b/c");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a", "/"));
        assert!(is_within("/a", "/a"));
        assert!(is_within("/a/b", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(!is_within("/b", "/a"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(matches!(
            validate_name(".DS_Store"),
            Err(DriveError::InvalidArgument(_))
        ));
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
