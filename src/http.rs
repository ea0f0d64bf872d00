//! Boundary request/response model and the query-string codec.
//!
//! The engine does not speak wire HTTP; the embedding server adapts its
//! framing to [`Request`] and [`Response`]. Only the query parameters the
//! core consumes are named here: `action`, `lrs`, `port`, `oob`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Query key naming the action(s) to fire this cycle. Repeatable.
pub const PARAM_ACTION: &str = "action";
/// Query key carrying the last-rendered-state frame token.
pub const PARAM_FRAME: &str = "lrs";
/// Query key addressing a nested conversation.
pub const PARAM_PORT: &str = "port";
/// Query key marking an out-of-band, non-rendering exchange.
pub const PARAM_OOB: &str = "oob";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// HTTP method, as far as the core cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// Idempotent fetch.
    #[default]
    Get,
    /// Form submit.
    Post,
}

/// Uploaded content attached to a request.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Wire field name the upload was submitted under.
    pub field: String,
    /// Client-supplied file name.
    pub file_name: String,
    /// Raw content.
    pub content: Vec<u8>,
}

/// An inbound request, already parsed by the HTTP boundary.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Method.
    pub method: Method,
    /// Conversation path (`/order/123`).
    pub path: String,
    /// Query parameters, name → values in arrival order.
    pub query: BTreeMap<String, Vec<String>>,
    /// Body (form) parameters.
    pub body: BTreeMap<String, Vec<String>>,
    /// Uploaded content, if any.
    pub upload: Option<Upload>,
}

impl Request {
    /// A GET request for a conversation path.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            ..Self::default()
        }
    }

    /// A POST request for a conversation path.
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Append a query parameter (builder).
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Append a body parameter (builder).
    pub fn with_body_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Attach an upload (builder).
    pub fn with_upload(mut self, upload: Upload) -> Self {
        self.upload = Some(upload);
        self
    }

    /// Append every parameter from an encoded query string (builder). Used to
    /// replay callback URLs.
    pub fn with_query_string(mut self, encoded: &str) -> Self {
        for (name, value) in decode_query(encoded) {
            self.query.entry(name).or_default().push(value);
        }
        self
    }

    /// First value for a parameter, query before body.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|v| v.first())
            .or_else(|| self.body.get(name).and_then(|v| v.first()))
            .map(String::as_str)
    }

    /// All values for a parameter, query values before body values.
    pub fn params(&self, name: &str) -> Vec<&str> {
        let mut values: Vec<&str> = Vec::new();
        if let Some(q) = self.query.get(name) {
            values.extend(q.iter().map(String::as_str));
        }
        if let Some(b) = self.body.get(name) {
            values.extend(b.iter().map(String::as_str));
        }
        values
    }

    /// The supplied frame token, if any.
    pub fn frame_token(&self) -> Option<&str> {
        self.param(PARAM_FRAME)
    }

    /// The action names to fire this cycle, in arrival order.
    pub fn action_names(&self) -> Vec<&str> {
        self.params(PARAM_ACTION)
    }

    /// The addressed nested port, if any.
    pub fn port_id(&self) -> Option<&str> {
        self.param(PARAM_PORT)
    }

    /// The out-of-band marker, if any.
    pub fn oob(&self) -> Option<&str> {
        self.param(PARAM_OOB)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// An outbound response under construction.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Content type, if set.
    pub content_type: Option<String>,
    /// Additional headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Body.
    pub body: String,
}

impl Response {
    /// An empty 200 response.
    pub fn ok() -> Self {
        Self {
            status: 200,
            content_type: None,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// A 404 response.
    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: Some("text/plain".to_owned()),
            headers: Vec::new(),
            body: "not found".to_owned(),
        }
    }

    /// A plain-text response with the given status.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain".to_owned()),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A 303 redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut response = Self::ok();
        response.status = 303;
        response.headers.push(("Location".to_owned(), location.into()));
        response
    }

    /// Set a header (builder).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this is a 3xx redirect.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

// ---------------------------------------------------------------------------
// Query codec
// ---------------------------------------------------------------------------

/// Percent-encode one query component.
pub fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

/// Decode one percent-encoded query component.
pub fn decode_component(encoded: &str) -> String {
    fn hex_digit(byte: u8) -> Option<u8> {
        match byte {
            b'0'..=b'9' => Some(byte - b'0'),
            b'a'..=b'f' => Some(byte - b'a' + 10),
            b'A'..=b'F' => Some(byte - b'A' + 10),
            _ => None,
        }
    }

    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    // A bare percent sign passes through unchanged.
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Encode `(name, value)` pairs as a query string (no leading `?`).
pub fn encode_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (name, value) in pairs {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(&encode_component(name));
        out.push('=');
        out.push_str(&encode_component(value));
    }
    out
}

/// Decode a query string into `(name, value)` pairs, preserving order and
/// duplicates.
pub fn decode_query(encoded: &str) -> Vec<(String, String)> {
    let trimmed = encoded.strip_prefix('?').unwrap_or(encoded);
    let mut pairs = Vec::new();
    for piece in trimmed.split('&') {
        if piece.is_empty() {
            continue;
        }
        match piece.split_once('=') {
            Some((name, value)) => {
                pairs.push((decode_component(name), decode_component(value)));
            }
            None => pairs.push((decode_component(piece), String::new())),
        }
    }
    pairs
}

/// Append encoded `(name, value)` pairs to a URL that may already carry a
/// query string.
pub fn append_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_owned();
    }
    let refs: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(n, v)| (n.as_str(), v.as_str()))
        .collect();
    let encoded = encode_query(refs);
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{encoded}")
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ── Request ──────────────────────────────────────────────────────

    #[test]
    fn request_builders() {
        let request = Request::get("/order/123")
            .with_param(PARAM_ACTION, "submit")
            .with_param(PARAM_FRAME, "F1");
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/order/123");
        assert_eq!(request.frame_token(), Some("F1"));
        assert_eq!(request.action_names(), vec!["submit"]);
    }

    #[test]
    fn request_repeatable_actions() {
        let request = Request::get("/p")
            .with_param(PARAM_ACTION, "a")
            .with_param(PARAM_ACTION, "b");
        assert_eq!(request.action_names(), vec!["a", "b"]);
    }

    #[test]
    fn request_query_shadows_body() {
        let request = Request::post("/p")
            .with_param("x", "q")
            .with_body_param("x", "b");
        assert_eq!(request.param("x"), Some("q"));
        assert_eq!(request.params("x"), vec!["q", "b"]);
    }

    #[test]
    fn request_body_only_param() {
        let request = Request::post("/p").with_body_param("v1_0", "Ada");
        assert_eq!(request.param("v1_0"), Some("Ada"));
    }

    #[test]
    fn request_from_query_string() {
        let request = Request::get("/p").with_query_string("action=submit&lrs=F1&x=a+b");
        assert_eq!(request.action_names(), vec!["submit"]);
        assert_eq!(request.frame_token(), Some("F1"));
        assert_eq!(request.param("x"), Some("a b"));
    }

    #[test]
    fn request_port_and_oob() {
        let request = Request::get("/p")
            .with_param(PARAM_PORT, "side")
            .with_param(PARAM_OOB, "ping");
        assert_eq!(request.port_id(), Some("side"));
        assert_eq!(request.oob(), Some("ping"));
    }

    // ── Response ─────────────────────────────────────────────────────

    #[test]
    fn response_redirect() {
        let response = Response::redirect("/next?x=1");
        assert_eq!(response.status, 303);
        assert!(response.is_redirect());
        assert_eq!(response.header("location"), Some("/next?x=1"));
    }

    #[test]
    fn response_header_lookup_case_insensitive() {
        let response = Response::ok().with_header("Cache-Control", "no-cache");
        assert_eq!(response.header("cache-control"), Some("no-cache"));
        assert_eq!(response.header("missing"), None);
    }

    // ── Query codec ──────────────────────────────────────────────────

    #[test]
    fn encode_component_escapes_reserved() {
        assert_eq!(encode_component("a b"), "a+b");
        assert_eq!(encode_component("a&b=c"), "a%26b%3Dc");
        assert_eq!(encode_component("safe-._~"), "safe-._~");
        assert_eq!(encode_component("100%"), "100%25");
    }

    #[test]
    fn decode_component_round_trip() {
        for raw in ["a b", "a&b=c", "100%", "naïve", "plain"] {
            assert_eq!(decode_component(&encode_component(raw)), raw);
        }
    }

    #[test]
    fn decode_component_tolerates_bad_escape() {
        assert_eq!(decode_component("50%"), "50%");
        assert_eq!(decode_component("%zz"), "%zz");
    }

    #[test]
    fn query_round_trip() {
        let encoded = encode_query([("action", "submit"), ("lrs", "F1"), ("q", "a b")]);
        assert_eq!(encoded, "action=submit&lrs=F1&q=a+b");
        let decoded = decode_query(&encoded);
        assert_eq!(
            decoded,
            vec![
                ("action".to_owned(), "submit".to_owned()),
                ("lrs".to_owned(), "F1".to_owned()),
                ("q".to_owned(), "a b".to_owned()),
            ]
        );
    }

    #[test]
    fn decode_query_leading_question_mark() {
        let decoded = decode_query("?a=1&b=2");
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn decode_query_valueless_pair() {
        let decoded = decode_query("flag&x=1");
        assert_eq!(decoded[0], ("flag".to_owned(), String::new()));
    }

    #[test]
    fn append_query_picks_separator() {
        let pairs = vec![("ctx".to_owned(), "42".to_owned())];
        assert_eq!(append_query("/page", &pairs), "/page?ctx=42");
        assert_eq!(append_query("/page?a=1", &pairs), "/page?a=1&ctx=42");
        assert_eq!(append_query("/page", &[]), "/page");
    }
}
