//! Probe contract and the form-POST/JSON HTTP probe.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::DEFAULT_PROBE_TIMEOUT_SECS;
use crate::descriptor::RequestDescriptor;
use crate::error::ProbeBuildError;

/// Classified result of one probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The result is published
    Success { payload: String },
    /// The server answered but the result is not there yet
    Failure { reason: String },
    /// Timeout, connection fault or unreadable response
    TransportError { reason: String },
}

impl AttemptOutcome {
    /// Payload for a success, reason otherwise
    pub fn detail(&self) -> &str {
        match self {
            AttemptOutcome::Success { payload } => payload,
            AttemptOutcome::Failure { reason } | AttemptOutcome::TransportError { reason } => {
                reason
            }
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success { payload } => write!(f, "success: {payload}"),
            AttemptOutcome::Failure { reason } => write!(f, "failure: {reason}"),
            AttemptOutcome::TransportError { reason } => write!(f, "transport error: {reason}"),
        }
    }
}

/// Performs one remote check and classifies it
///
/// Implementations must bound their own duration; the engine treats
/// `attempt` as an opaque call.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn attempt(&self) -> AttemptOutcome;
}

/// JSON fields that mark a published result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessMarker {
    pub status_field: String,
    pub ok_value: String,
    pub data_field: String,
}

impl Default for SuccessMarker {
    fn default() -> Self {
        Self { status_field: "msg".into(), ok_value: "ok".into(), data_field: "data".into() }
    }
}

/// Settings for [`HttpProbe`] that do not come from the descriptor
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Form key carrying the descriptor's body field
    pub body_field: String,
    /// Form key sent with an empty value
    pub secondary_field: Option<String>,
    pub marker: SuccessMarker,
    pub user_agent: Option<String>,
    /// Applied after the descriptor's headers, replacing same-named ones
    pub extra_headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            body_field: "stage".into(),
            secondary_field: Some("jym".into()),
            marker: SuccessMarker::default(),
            user_agent: None,
            extra_headers: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }
}

/// Form-encoded POST probe that expects a JSON answer
pub struct HttpProbe {
    client: reqwest::Client,
    url: Url,
    headers: HeaderMap,
    form: Vec<(String, String)>,
    marker: SuccessMarker,
}

impl HttpProbe {
    pub fn new(
        descriptor: &RequestDescriptor,
        settings: ProbeSettings,
    ) -> Result<Self, ProbeBuildError> {
        let url = Url::parse(descriptor.target_url()).map_err(|source| {
            ProbeBuildError::InvalidUrl { url: descriptor.target_url().to_string(), source }
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in descriptor.headers().iter().chain(settings.extra_headers.iter()) {
            // Cookies and body length are derived below and by the client
            if name.eq_ignore_ascii_case("cookie") || name.eq_ignore_ascii_case("content-length")
            {
                continue;
            }
            headers.insert(header_name(name)?, header_value(name, value)?);
        }
        if let Some(agent) = settings.user_agent.as_deref().filter(|agent| !agent.is_empty()) {
            headers.insert(USER_AGENT, header_value("User-Agent", agent)?);
        }
        let cookie = descriptor.cookie_header();
        if !cookie.is_empty() {
            headers.insert(COOKIE, header_value("Cookie", &cookie)?);
        }

        let mut form = vec![(
            settings.body_field.clone(),
            descriptor.body_field().unwrap_or_default().to_string(),
        )];
        if let Some(secondary) = settings.secondary_field {
            form.push((secondary, String::new()));
        }

        let client = reqwest::Client::builder().timeout(settings.timeout).build()?;

        Ok(Self { client, url, headers, form, marker: settings.marker })
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn attempt(&self) -> AttemptOutcome {
        let start = Instant::now();

        let response = match self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .form(&self.form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return AttemptOutcome::TransportError { reason: format!("request failed: {e}") };
            }
        };

        let status = response.status();
        debug!(status = status.as_u16(), latency_ms = start.elapsed().as_millis() as u64, "Probe response");

        if !status.is_success() {
            return AttemptOutcome::Failure { reason: format!("HTTP error: {}", status.as_u16()) };
        }

        match response.text().await {
            Ok(body) => classify_body(&body, &self.marker),
            Err(e) => AttemptOutcome::TransportError { reason: format!("failed to read body: {e}") },
        }
    }
}

/// Classify a 2xx response body against the success marker
pub fn classify_body(body: &str, marker: &SuccessMarker) -> AttemptOutcome {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            return AttemptOutcome::TransportError { reason: format!("malformed response: {e}") };
        }
    };

    let status = value.get(&marker.status_field);
    let published = status.and_then(Value::as_str) == Some(marker.ok_value.as_str());

    match value.get(&marker.data_field) {
        Some(data) if published && is_present(data) => {
            let payload = match data {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            AttemptOutcome::Success { payload }
        }
        _ => {
            let status_text = match status {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => "unknown status".to_string(),
            };
            AttemptOutcome::Failure { reason: format!("result not published: {status_text}") }
        }
    }
}

/// Non-empty JSON value: not null, false, zero, or an empty string/array/object
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn header_name(name: &str) -> Result<HeaderName, ProbeBuildError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ProbeBuildError::InvalidHeader(name.to_string()))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ProbeBuildError> {
    HeaderValue::from_str(value).map_err(|_| ProbeBuildError::InvalidHeader(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_published() {
        let outcome =
            classify_body(r#"{"msg":"ok","data":"publish date 2025-07-01"}"#, &SuccessMarker::default());
        assert_eq!(outcome, AttemptOutcome::Success { payload: "publish date 2025-07-01".into() });

        let outcome = classify_body(r#"{"msg":"ok","data":{"score":45}}"#, &SuccessMarker::default());
        assert_eq!(outcome, AttemptOutcome::Success { payload: r#"{"score":45}"#.into() });
    }

    #[test]
    fn test_classify_not_published() {
        let marker = SuccessMarker::default();

        assert_eq!(
            classify_body(r#"{"msg":"ok","data":""}"#, &marker),
            AttemptOutcome::Failure { reason: "result not published: ok".into() }
        );
        assert_eq!(
            classify_body(r#"{"msg":"not yet","data":"x"}"#, &marker),
            AttemptOutcome::Failure { reason: "result not published: not yet".into() }
        );
        assert_eq!(
            classify_body(r#"{"data":[]}"#, &marker),
            AttemptOutcome::Failure { reason: "result not published: unknown status".into() }
        );
    }

    #[test]
    fn test_classify_malformed_body() {
        let outcome = classify_body("<html>", &SuccessMarker::default());
        assert!(matches!(outcome, AttemptOutcome::TransportError { .. }));
    }

    #[test]
    fn test_custom_marker() {
        let marker = SuccessMarker {
            status_field: "state".into(),
            ok_value: "done".into(),
            data_field: "result".into(),
        };
        let outcome = classify_body(r#"{"state":"done","result":[1]}"#, &marker);
        assert_eq!(outcome, AttemptOutcome::Success { payload: "[1]".into() });
    }

    #[test]
    fn test_probe_rejects_bad_header() {
        let descriptor = RequestDescriptor::new("https://x.test/q").unwrap().with_header("Bad Name", "v");
        let result = HttpProbe::new(&descriptor, ProbeSettings::default());
        assert!(matches!(result, Err(ProbeBuildError::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_transport_error() {
        let descriptor = RequestDescriptor::new("http://127.0.0.1:9/q").unwrap().with_body_field("2025 H1");
        let settings = ProbeSettings { timeout: Duration::from_secs(2), ..ProbeSettings::default() };
        let probe = HttpProbe::new(&descriptor, settings).unwrap();

        let outcome = probe.attempt().await;
        assert!(matches!(outcome, AttemptOutcome::TransportError { .. }), "got {outcome:?}");
    }
}
