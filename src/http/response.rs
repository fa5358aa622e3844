//! Builds an HTTP/1.1 response directly into a [`Buffer`]'s writable region.
//!
//! Mechanical by design: the only real contract is leaving the out-buffer ready
//! for write-readiness dispatch by the reactor. Grounded loosely on the source's
//! `Response`-shaped output (status line + headers + body) as shown in the
//! teacher's own `parser/h1/response.rs`, generalized to write straight into a
//! `Buffer` instead of building an intermediate owned struct.

use std::fs;
use std::path::Path;

use crate::buffer::Buffer;
use crate::http::status::Status;
use crate::mime::mime_for_path;

/// Resolves `path` under `doc_root` and writes a complete response (status line,
/// headers, body) into `out`. Never fails: missing/forbidden resources produce a
/// 404/403 response body instead of propagating an error, since the client still
/// needs *a* response.
pub fn write_response(out: &mut Buffer, doc_root: &Path, path: &str, is_keep_alive: bool) {
    let resolved = doc_root.join(path.trim_start_matches('/'));

    let (status, body): (Status, Vec<u8>) = match fs::metadata(&resolved) {
        Ok(meta) if meta.is_file() => match fs::read(&resolved) {
            Ok(bytes) => (Status::Ok, bytes),
            Err(_) => (Status::Forbidden, forbidden_page()),
        },
        Ok(_) => (Status::Forbidden, forbidden_page()),
        Err(_) => (Status::NotFound, not_found_page()),
    };

    write_status_line(out, status);
    write_connection_headers(out, is_keep_alive);
    out.append(format!("Content-Type: {}\r\n", mime_for_path(path)).as_bytes());
    out.append(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.append(&body);
}

/// Writes a 400 response with no keep-alive (a malformed request leaves no
/// trustworthy parser state to decide otherwise) and no body to speak of.
pub fn write_bad_request(out: &mut Buffer) {
    write_status_line(out, Status::BadRequest);
    write_connection_headers(out, false);
    let body = bad_request_page();
    out.append(b"Content-Type: text/html\r\n");
    out.append(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.append(&body);
}

fn write_status_line(out: &mut Buffer, status: Status) {
    out.append(format!("HTTP/1.1 {} {}\r\n", status.code(), status.reason_phrase()).as_bytes());
}

fn write_connection_headers(out: &mut Buffer, is_keep_alive: bool) {
    if is_keep_alive {
        out.append(b"Connection: keep-alive\r\n");
        out.append(b"Keep-Alive: max=6, timeout=120\r\n");
    } else {
        out.append(b"Connection: close\r\n");
    }
}

fn not_found_page() -> Vec<u8> {
    b"<html><body><h1>404 Not Found</h1></body></html>".to_vec()
}

fn forbidden_page() -> Vec<u8> {
    b"<html><body><h1>403 Forbidden</h1></body></html>".to_vec()
}

fn bad_request_page() -> Vec<u8> {
    b"<html><body><h1>400 Bad Request</h1></body></html>".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn tempdir_with(name: &str, contents: &[u8]) -> tempfile_dir::TempDir {
        let dir = tempfile_dir::TempDir::new();
        let mut f = fs::File::create(dir.path().join(name)).unwrap();
        f.write_all(contents).unwrap();
        dir
    }

    // Minimal ad hoc temp-dir helper: avoids pulling in a `tempfile` dev-dependency
    // for a handful of response-builder tests.
    mod tempfile_dir {
        use std::path::{Path, PathBuf};

        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new() -> Self {
                let dir = std::env::temp_dir().join(format!(
                    "rask-test-{}-{}",
                    std::process::id(),
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_nanos()
                ));
                std::fs::create_dir_all(&dir).unwrap();
                TempDir(dir)
            }

            pub fn path(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[test]
    fn existing_file_yields_200_with_body() {
        let dir = tempdir_with("index.html", b"hello");
        let mut out = Buffer::new(256);
        write_response(&mut out, dir.path(), "/index.html", true);
        let rendered = String::from_utf8_lossy(out.peek()).into_owned();
        assert!(rendered.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(rendered.contains("Content-Type: text/html"));
        assert!(rendered.ends_with("hello"));
    }

    #[test]
    fn bad_request_yields_400_and_closes() {
        let mut out = Buffer::new(256);
        write_bad_request(&mut out);
        let rendered = String::from_utf8_lossy(out.peek()).into_owned();
        assert!(rendered.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(rendered.contains("Connection: close"));
    }

    #[test]
    fn missing_file_yields_404() {
        let dir = tempdir_with("index.html", b"hello");
        let mut out = Buffer::new(256);
        write_response(&mut out, dir.path(), "/missing.html", false);
        let rendered = String::from_utf8_lossy(out.peek()).into_owned();
        assert!(rendered.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(rendered.contains("Connection: close"));
    }
}
