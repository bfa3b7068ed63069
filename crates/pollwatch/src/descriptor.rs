//! Parsed shape of a captured HTTP request.

use url::Url;

use crate::error::ParseError;

/// Immutable snapshot of a request: target URL, headers, cookies and the
/// distinguished body field.
///
/// The only way in is [`RequestDescriptor::new`], so the target URL is always
/// absolute. It has no serde impls:
///
/// ```compile_fail
/// let _: pollwatch::RequestDescriptor = serde_json::from_str(r#"{"target_url":""}"#).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    target_url: String,

    /// Insertion-ordered, case-sensitive as captured
    headers: Vec<(String, String)>,

    /// All pairs in capture order, duplicates kept
    cookies: Vec<(String, String)>,

    body_field: Option<String>,
}

impl RequestDescriptor {
    /// Start a descriptor for an absolute `http`/`https` URL
    pub fn new(target_url: impl Into<String>) -> Result<Self, ParseError> {
        let target_url = target_url.into();
        match Url::parse(&target_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ParseError::MissingUrl),
        }

        Ok(Self { target_url, headers: Vec::new(), cookies: Vec::new(), body_field: None })
    }

    /// Add a header. A repeated name keeps its first position and takes the
    /// later value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    pub fn with_cookie(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((key.into(), value.into()));
        self
    }

    pub fn with_body_field(mut self, value: impl Into<String>) -> Self {
        self.body_field = Some(value.into());
        self
    }

    pub fn target_url(&self) -> &str { &self.target_url }

    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    pub fn cookies(&self) -> &[(String, String)] { &self.cookies }

    pub fn body_field(&self) -> Option<&str> { self.body_field.as_deref() }

    /// Look up a header by its exact captured name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Cookies joined as `k=v; k=v`, suitable for a `Cookie` header
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
