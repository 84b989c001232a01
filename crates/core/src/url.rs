//! Artifact URL shaping.
//!
//! Exactly two URL shapes address a deployment server:
//! `<server>/<filename>` for per-server files such as the deploy history,
//! and `<server>/<build-hash>-<filename>` for per-build artifacts.

/// Strip trailing slashes so a URL can be used as a base prefix.
pub fn sanitize_base_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Build the URL for a file on a server. An empty build hash addresses a
/// per-server file; otherwise the hash is joined to the filename with `-`.
pub fn build_file_url(server: &str, hash: &str, file: &str) -> String {
    if hash.is_empty() {
        format!("{}/{}", sanitize_base_url(server), file)
    } else {
        format!("{}/{}-{}", sanitize_base_url(server), hash, file)
    }
}
