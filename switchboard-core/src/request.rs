use std::collections::HashMap;
use std::fmt;

/// Canonical HTTP methods this framework's records carry an enum tag for.
///
/// The wire-visible `method` string on [`Request`] is always the canonical
/// uppercase form; this tag exists so route matching and middleware don't
/// need to re-parse that string on every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(raw: &str) -> Option<HttpMethod> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive header bag. Retrieval ignores case; a write for a name
/// that already exists (by case-insensitive comparison) replaces the prior
/// entry and adopts the newly-written case.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            *slot = (name, value.into());
        } else {
            self.entries.push((name, value.into()));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A canonical inbound request record, decoupled from any particular wire
/// transport (HTTP/1.1 framing, HTTP/2 stream multiplexing, etc).
#[derive(Debug, Clone)]
pub struct Request {
    pub method: HttpMethod,
    /// Path with any `?query` suffix stripped; never contains `?`.
    pub path: String,
    pub protocol: String,
    pub headers: Headers,
    pub query: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
    pub body: bytes::Bytes,
    /// Stream identifier for multiplexed protocols (HTTP/2); 0 otherwise.
    pub stream_id: u32,
    /// Transport-reported peer address, when the transport supplies one.
    pub peer_addr: Option<String>,
}

impl Request {
    /// Builds a request, splitting any `?query` suffix out of `raw_path`
    /// into the query map. `raw_path` may or may not contain a query string.
    pub fn new(method: HttpMethod, raw_path: impl Into<String>, protocol: impl Into<String>) -> Self {
        let raw_path = raw_path.into();
        let (path, query) = split_query(&raw_path);
        Request {
            method,
            path,
            protocol: protocol.into(),
            headers: Headers::new(),
            query,
            path_params: HashMap::new(),
            body: bytes::Bytes::new(),
            stream_id: 0,
            peer_addr: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body_as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn split_query(raw_path: &str) -> (String, HashMap<String, String>) {
    let mut query = HashMap::new();
    let (path, qs) = match raw_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (raw_path, None),
    };
    if let Some(qs) = qs {
        for pair in qs.split('&') {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((k, v)) => {
                    query.insert(k.to_string(), v.to_string());
                }
                None => {
                    query.insert(pair.to_string(), String::new());
                }
            }
        }
    }
    (path.to_string(), query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_query_string_out_of_path() {
        let req = Request::new(HttpMethod::Get, "/api/users?active=true&page=2", "HTTP/1.1");
        assert_eq!(req.path, "/api/users");
        assert!(!req.path.contains('?'));
        assert_eq!(req.query.get("active"), Some(&"true".to_string()));
        assert_eq!(req.query.get("page"), Some(&"2".to_string()));
    }

    #[test]
    fn path_without_query_is_unchanged() {
        let req = Request::new(HttpMethod::Post, "/api/users", "HTTP/1.1");
        assert_eq!(req.path, "/api/users");
        assert!(req.query.is_empty());
    }

    #[test]
    fn headers_are_case_insensitive_on_read() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json");
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn header_write_replaces_existing_case_insensitively() {
        let mut headers = Headers::new();
        headers.set("X-Token", "a");
        headers.set("x-token", "b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-TOKEN"), Some("b"));
    }

    #[test]
    fn method_parse_round_trips_through_as_str() {
        for m in [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Delete,
            HttpMethod::Patch,
            HttpMethod::Head,
            HttpMethod::Options,
        ] {
            assert_eq!(HttpMethod::parse(m.as_str()), Some(m));
        }
        assert_eq!(HttpMethod::parse("bogus"), None);
    }
}
