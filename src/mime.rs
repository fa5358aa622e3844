//! Static resource whitelist and extension-to-MIME-type table.
//!
//! The whitelist and the `DEFAULT_HTML_TAG` pair are read verbatim off
//! `httprequest.cpp`'s `DEFAULT_HTML`/`DEFAULT_HTML_TAG` sets; they explain why the
//! server recognizes exactly these path stems.

/// Path stems (without `.html`) that the parser's `canonicalize_path` step
/// recognizes and extends with `.html`.
pub const RESOURCE_WHITELIST: &[&str] = &[
    "/login",
    "/register",
    "/index",
    "/error",
    "/JSON",
    "/linux",
    "/Xshell",
    "/Docker2022",
    "/lucky",
];

/// Canonicalized paths that additionally trigger the authentication side effect in
/// `parse_post`, tagged 0 (register) / 1 (login).
pub fn auth_tag(canonical_path: &str) -> Option<bool> {
    match canonical_path {
        "/register.html" => Some(false),
        "/login.html" => Some(true),
        _ => None,
    }
}

/// Maps a file extension (without the leading dot) to a MIME type, falling back to
/// `text/plain` for anything unrecognized.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Looks up the MIME type for `path` by its extension.
pub fn mime_for_path(path: &str) -> &'static str {
    match path.rsplit_once('.') {
        Some((_, ext)) => mime_for_extension(ext),
        None => "application/octet-stream",
    }
}
