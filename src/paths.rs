//! Path normalization and projection.
//!
//! Drive paths are POSIX-style with forward slashes; the leading slash is
//! optional on input. Internally paths are stored without a leading slash
//! and the empty string denotes the root.

/// Normalize a path: collapse slashes, resolve `.` and `..` (clamped at the
/// root), drop the leading slash. Returns `""` for the root.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Parent of a normalized path; `""` for top-level entries and the root.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Resolve a symlink target against the link's own location: absolute
/// targets stand alone, relative targets resolve against the link's parent.
pub fn resolve_link(linkname: &str, link_path: &str) -> String {
    if linkname.starts_with('/') {
        normalize(linkname)
    } else {
        normalize(&format!("{}/{}", parent(link_path), linkname))
    }
}

/// Path of `key` relative to `prefix`. Caller guarantees containment.
pub fn relative<'a>(prefix: &str, key: &'a str) -> &'a str {
    if prefix.is_empty() {
        key
    } else {
        &key[prefix.len() + 1..]
    }
}

/// First segment of `key` relative to `prefix`: the readdir projection.
pub fn first_segment<'a>(prefix: &str, key: &'a str) -> &'a str {
    let rel = relative(prefix, key);
    match rel.find('/') {
        Some(idx) => &rel[..idx],
        None => rel,
    }
}
