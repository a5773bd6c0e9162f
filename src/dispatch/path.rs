//! URL helpers shared by the filter and the router.

use url::Url;

/// Returns the path component of a request target.
///
/// Absolute URIs lose their scheme and authority; every target loses its
/// query string and fragment. The path is sliced out of the raw target, so
/// it is neither decoded nor dot-normalized, whichever form the target has.
///
/// ```
/// # use dispatch_engine::dispatch::path::pathname;
/// assert_eq!(pathname("/a/b?x=1#y"), "/a/b");
/// assert_eq!(pathname("http://example.com/a/b?x=1"), "/a/b");
/// assert_eq!(pathname("http://example.com/a/../b"), "/a/../b");
/// ```
pub fn pathname(uri: &str) -> String {
    let target = match absolute_form_path(uri) {
        Some(path) => path,
        None => uri,
    };

    let end = target.find(['?', '#']).unwrap_or(target.len());
    match &target[..end] {
        "" if target.len() != uri.len() => "/".to_string(),
        path => path.to_string(),
    }
}

/// Raw remainder of an absolute-form target after its authority, or `None`
/// when `uri` is not an absolute URI with a host.
fn absolute_form_path(uri: &str) -> Option<&str> {
    let url = Url::parse(uri).ok()?;
    if !url.has_host() {
        return None;
    }

    let (_, rest) = uri.split_once("://")?;
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&rest[authority_end..])
}

/// Whether a filter string should be treated as a glob pattern rather
/// than a literal path prefix.
///
/// Parentheses only count as part of an extglob (`@(`, `!(`, `+(`); a lone
/// `(` or `)` is literal.
pub fn is_glob(pattern: &str) -> bool {
    pattern.starts_with('!')
        || pattern.contains(['*', '?', '[', ']', '{', '}'])
        || ["@(", "!(", "+("].iter().any(|ext| pattern.contains(ext))
}
