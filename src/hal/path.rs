/// Splits a path around its final `/` into `(parent, name)`.
///
/// A path with no `/` has an empty parent and is resolved relative to
/// whatever base the caller anchors it to. The parent of a top-level entry
/// like `/a` is `/` itself, which keeps absolute paths anchored at the root
/// through recursive resolution.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        None => ("", path),
        Some(0) => ("/", &path[1..]),
        Some(pos) => (&path[..pos], &path[pos + 1..]),
    }
}
