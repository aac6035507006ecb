use indexmap::IndexMap;
use std::io::Read;

use crate::error::InterceptorError;

/// Header multimap keyed by canonical header name
pub type Headers = IndexMap<String, Vec<String>>;

/// Canonical MIME header form: the first letter and every letter after a
/// hyphen upper-cased, the rest lower-cased. Names containing characters
/// outside the token set are returned unchanged.
pub fn canonical_header_key(name: &str) -> String {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !valid {
        return name.to_string();
    }
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// An inbound request. The body is owned bytes; an empty body means `{}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub url: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header value under its canonical name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .entry(canonical_header_key(name))
            .or_default()
            .push(value.into());
    }

    /// All values for `name`, matched canonically.
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .get(&canonical_header_key(name))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Build a request by draining `reader` as the body. The reader is
    /// consumed and dropped whether or not the read succeeds.
    pub fn from_reader<R: Read>(
        url: impl Into<String>,
        headers: Headers,
        mut reader: R,
    ) -> Result<Self, InterceptorError> {
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        let mut request = Self::new(url).with_body(body);
        for (name, values) in headers {
            for value in values {
                request.add_header(&name, value);
            }
        }
        Ok(request)
    }

    /// The body to decode: the raw bytes, or `{}` when empty.
    pub fn payload(&self) -> &[u8] {
        if self.body.is_empty() {
            b"{}"
        } else {
            &self.body
        }
    }
}

/// Result of a successful run: the request headers and the rewritten body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_canonical_header_key() {
        assert_eq!(canonical_header_key("content-type"), "Content-Type");
        assert_eq!(canonical_header_key("X-GITHUB-EVENT"), "X-Github-Event");
        assert_eq!(canonical_header_key("accept"), "Accept");
        assert_eq!(canonical_header_key("bad header"), "bad header");
        assert_eq!(canonical_header_key(""), "");
    }

    #[test]
    fn test_headers_merge_canonically() {
        let request = Request::new("http://x")
            .with_header("x-event", "push")
            .with_header("X-Event", "ping");
        assert_eq!(request.header_values("X-EVENT"), ["push", "ping"]);
        assert!(request.header_values("missing").is_empty());
    }

    #[test]
    fn test_empty_body_defaults_to_object() {
        assert_eq!(Request::new("/").payload(), b"{}");
        assert_eq!(Request::new("/").with_body("[1]").payload(), b"[1]");
    }

    #[test]
    fn test_from_reader() {
        let mut headers = Headers::new();
        headers.insert("content-type".into(), vec!["application/json".into()]);
        let request = Request::from_reader("/hook", headers, io::Cursor::new(b"{\"a\":1}")).unwrap();
        assert_eq!(request.body, b"{\"a\":1}");
        assert_eq!(request.header_values("Content-Type"), ["application/json"]);
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_from_reader_error() {
        let err = Request::from_reader("/", Headers::new(), Broken).unwrap_err();
        assert_eq!(err.stage(), "read");
        match err {
            InterceptorError::BodyRead(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected BodyRead, got {:?}", other),
        }
    }
}
