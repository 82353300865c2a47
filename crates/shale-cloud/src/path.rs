//! Local-path to object-key flattening
//!
//! Cloud object stores have no native directory hierarchy, so local engine
//! file paths are flattened into a single dash-joined key segment. The
//! encoding keeps distinct local paths collision-free across processes
//! sharing a bucket, which is why it must stay byte-for-byte stable.

/// True for the characters treated as path separators
fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// Flattens a local hierarchical file path into a single object-key segment.
///
/// A Windows-style drive specifier (`C:\`) contributes its letter as the
/// leading component. Remaining components are joined by dashes; separators
/// at the very start of the path are consumed without emitting a dash.
///
/// A doubled separator mid-path emits a bare dash for the empty segment
/// (`a\\b` becomes `a--b`). That looks like an artifact rather than an
/// intentional encoding, but keys written by existing deployments depend on
/// it, so it is preserved and pinned by a test.
///
/// ```
/// use shale_cloud::flatten_path;
///
/// assert_eq!(flatten_path(r"C:\Users\foo\bar.sst"), "C-Users-foo-bar.sst");
/// assert_eq!(flatten_path("/var/lib/db/000001.log"), "var-lib-db-000001.log");
/// ```
pub fn flatten_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    // Single-letter drive specifier, e.g. "C:\" or "C:/"
    let bytes = rest.as_bytes();
    if bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && is_separator(bytes[2] as char)
    {
        out.push(bytes[0] as char);
        out.push('-');
        rest = &rest[3..];
    }

    while let Some(i) = rest.find(is_separator) {
        if i > 0 || !out.is_empty() {
            out.push_str(&rest[..i]);
            out.push('-');
        }
        rest = &rest[i + 1..];
    }
    out.push_str(rest);
    out
}

/// Joins a bucket object path with a flattened local file name.
///
/// An empty object path yields the bare flattened name.
pub fn object_key(object_path: &str, local_path: &str) -> String {
    let flat = flatten_path(local_path);
    let prefix = object_path.trim_end_matches('/');
    if prefix.is_empty() {
        flat
    } else {
        format!("{}/{}", prefix, flat)
    }
}
