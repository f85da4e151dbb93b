use crate::request::Headers;

/// A canonical outbound response record. `Content-Length` is kept in sync
/// with the body on every mutation — callers never set it by hand.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    body: bytes::Bytes,
}

impl Response {
    pub fn new(status: u16) -> Self {
        let mut resp = Response {
            status,
            headers: Headers::new(),
            body: bytes::Bytes::new(),
        };
        resp.sync_content_length();
        resp
    }

    pub fn ok() -> Self {
        Response::new(200)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.set_body(body);
        self
    }

    pub fn with_json_body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.headers.set("Content-Type", "application/json");
        self.set_body(body);
        self
    }

    pub fn set_body(&mut self, body: impl Into<bytes::Bytes>) {
        self.body = body.into();
        self.sync_content_length();
    }

    pub fn body(&self) -> &bytes::Bytes {
        &self.body
    }

    fn sync_content_length(&mut self) {
        self.headers.set("Content-Length", self.body.len().to_string());
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}
