//! Incremental HTTP/1.1 request parser.
//!
//! Drives an explicit state machine (`REQUEST_LINE -> HEADERS -> BODY -> FINISH`)
//! over CRLF-terminated lines pulled out of a [`Buffer`]. A partial line is left
//! untouched in the buffer until more bytes arrive — there is no regex over the
//! whole buffer, only intra-line matching, so a request spread across many reads
//! never gets re-parsed from scratch.
//!
//! Grounded on `HttpRequest::parse` in the source's `httprequest.cpp`, with the
//! three corrections called out in the design notes: the header-terminator check is
//! driven by an explicit empty line rather than a `readable_bytes() <= 2` heuristic
//! used alone (the no-more-data fast path still applies, but only after the empty
//! line matches, so a bodyless request goes straight to `Finish` instead of parking
//! in `Body` forever), percent-decoding writes into a fresh string instead of
//! mutating the body in place, and a malformed percent-escape is reported rather
//! than passed through verbatim.

use std::collections::HashMap;
use std::str::FromStr;

use crate::auth::UserVerifier;
use crate::buffer::Buffer;
use crate::error::{RaskError, Result};
use crate::http::method::Method;
use crate::http::version::Version;
use crate::mime::{auth_tag, RESOURCE_WHITELIST};

/// States of the incremental request parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for (and then parsing) the request line.
    RequestLine,
    /// Accumulating header lines until the blank line terminator.
    Headers,
    /// Consuming the single body line (see module docs: this parser, like its
    /// source, treats the body as one CRLF-terminated line rather than sizing it
    /// by `Content-Length`).
    Body,
    /// Parsing is complete; `path`/`method`/`headers`/`form` are final.
    Finish,
}

/// An in-progress or completed HTTP/1.1 request.
#[derive(Debug)]
pub struct HttpRequest {
    state: ParseState,
    method: Option<Method>,
    path: String,
    version: Option<Version>,
    headers: HashMap<String, String>,
    body: String,
    form: HashMap<String, String>,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    /// Creates a fresh request parser in the initial `REQUEST_LINE` state.
    pub fn new() -> Self {
        HttpRequest {
            state: ParseState::RequestLine,
            method: None,
            path: String::new(),
            version: None,
            headers: HashMap::new(),
            body: String::new(),
            form: HashMap::new(),
        }
    }

    /// Clears all fields and returns to `REQUEST_LINE`, for keep-alive reuse.
    pub fn reinit(&mut self) {
        *self = Self::new();
    }

    /// Current parser state.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// True once the request has been fully parsed.
    pub fn is_finished(&self) -> bool {
        self.state == ParseState::Finish
    }

    /// The canonicalized request path (post-whitelist rewrite / auth-result
    /// rewrite).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The parsed method, if the request line has been consumed.
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// Header map as parsed so far.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Decoded `application/x-www-form-urlencoded` body fields, if any.
    pub fn form(&self) -> &HashMap<String, String> {
        &self.form
    }

    /// True iff `Connection: keep-alive` was sent on an HTTP/1.1 request.
    pub fn is_keep_alive(&self) -> bool {
        self.version == Some(Version::H1_1)
            && self
                .headers
                .get("Connection")
                .is_some_and(|v| v.eq_ignore_ascii_case("keep-alive"))
    }

    /// Consumes as many complete CRLF-terminated lines as are available in `buf`,
    /// advancing the state machine. Leaves any trailing partial line untouched.
    /// `auth` is consulted if a login/register form submission completes during
    /// this call.
    pub fn parse(&mut self, buf: &mut Buffer, auth: &dyn UserVerifier) -> Result<()> {
        while self.state != ParseState::Finish {
            let Some(line_len) = find_crlf(buf.peek()) else {
                break;
            };
            let line = String::from_utf8_lossy(&buf.peek()[..line_len]).into_owned();
            buf.retrieve_until(line_len + 2);

            match self.state {
                ParseState::RequestLine => self.parse_request_line(&line)?,
                ParseState::Headers => {
                    self.parse_header_line(&line)?;
                    // The blank-line transition just fired; if nothing follows it,
                    // this request has no body line to wait for.
                    if self.state == ParseState::Body && buf.readable_bytes() == 0 {
                        self.state = ParseState::Finish;
                    }
                }
                ParseState::Body => {
                    self.body = line;
                    self.parse_post(auth);
                    self.state = ParseState::Finish;
                }
                ParseState::Finish => unreachable!(),
            }
        }
        Ok(())
    }

    fn parse_request_line(&mut self, line: &str) -> Result<()> {
        let mut parts = line.split(' ');
        let (Some(method), Some(target), Some(version_token), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(RaskError::ParseInvalid(format!("bad request line: {line}")));
        };

        let method = Method::from_str(method)
            .map_err(|_| RaskError::ParseInvalid(format!("unknown method: {method}")))?;
        let version_str = version_token
            .strip_prefix("HTTP/")
            .ok_or_else(|| RaskError::ParseInvalid(format!("bad version token: {version_token}")))?;
        let version = Version::from_str(version_str)
            .map_err(|_| RaskError::ParseInvalid(format!("unsupported version: {version_str}")))?;

        self.method = Some(method);
        self.version = Some(version);
        self.path = canonicalize_path(target);
        self.state = ParseState::Headers;
        Ok(())
    }

    fn parse_header_line(&mut self, line: &str) -> Result<()> {
        if line.is_empty() {
            // Explicit empty-line terminator (the corrected transition condition).
            self.state = ParseState::Body;
            return Ok(());
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(RaskError::ParseInvalid(format!("bad header line: {line}")));
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        self.headers.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn parse_post(&mut self, auth: &dyn UserVerifier) {
        let is_form_post = self.method == Some(Method::Post)
            && self
                .headers
                .get("Content-Type")
                .is_some_and(|ct| ct == "application/x-www-form-urlencoded");

        if is_form_post {
            match parse_urlencoded(&self.body) {
                Ok(form) => self.form = form,
                Err(err) => {
                    tracing::warn!(%err, "malformed urlencoded body; ignoring form fields");
                    self.form.clear();
                }
            }
        }

        if let Some(is_login) = auth_tag(&self.path) {
            let username = self.form.get("username").cloned().unwrap_or_default();
            let password = self.form.get("password").cloned().unwrap_or_default();
            self.path = if auth.verify_user(&username, &password, is_login) {
                "/welcome.html".to_string()
            } else {
                "/error.html".to_string()
            };
        }
    }
}

/// Rewrites `/` to `/index.html` and appends `.html` to any whitelisted resource
/// stem, leaving any other path untouched (it will 404 downstream).
fn canonicalize_path(path: &str) -> String {
    if path == "/" {
        "/index.html".to_string()
    } else if RESOURCE_WHITELIST.contains(&path) {
        format!("{path}.html")
    } else {
        path.to_string()
    }
}

/// Finds the index of the first `\r\n` in `data`, if any.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Decodes an `application/x-www-form-urlencoded` body into a fresh map. A
/// malformed percent-escape fails the whole decode rather than silently passing
/// the raw byte through.
fn parse_urlencoded(body: &str) -> Result<HashMap<String, String>> {
    let mut form = HashMap::new();
    for pair in body.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        form.insert(url_decode(key)?, url_decode(value)?);
    }
    Ok(form)
}

/// Decodes `+` to space and `%HH` to the corresponding byte, into a fresh
/// `String` (never mutates its input).
fn url_decode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hi = *bytes
                    .get(i + 1)
                    .ok_or_else(|| RaskError::ParseInvalid("truncated percent-escape".into()))?;
                let lo = *bytes
                    .get(i + 2)
                    .ok_or_else(|| RaskError::ParseInvalid("truncated percent-escape".into()))?;
                let hi = hex_digit(hi)
                    .ok_or_else(|| RaskError::ParseInvalid("invalid percent-escape".into()))?;
                let lo = hex_digit(lo)
                    .ok_or_else(|| RaskError::ParseInvalid("invalid percent-escape".into()))?;
                out.push(hi * 16 + lo);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// `0-9` -> 0-9, `A-F`/`a-f` -> 10-15, anything else is not a hex digit.
fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}
