//! Page fetcher
//!
//! This module issues one HTTP call for one candidate request and classifies the
//! result, including:
//! - Transport failures and non-2xx statuses
//! - Empty and opaque (non-JSON) bodies, with diagnostic capture
//! - API-level errors, classified as rate-limited or auth-required from free text
//! - Schema failures when the item list is missing
//!
//! Every failure is transient from the fetcher's point of view; deciding whether to
//! retry is the scheduler's job.

use crate::crawler::transport::{HttpTransport, RawResponse, TransportError};
use crate::endpoint::EndpointDescriptor;
use crate::output::sanitize_file_stem;
use crate::record::as_i64;
use crate::state::Cursor;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of body bytes kept in a diagnostic artifact
pub const DEFAULT_DIAGNOSTIC_LIMIT: usize = 2000;

/// How an API error message was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    RateLimited,
    AuthRequired,
    Other,
}

/// Fixed failure taxonomy for one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Network(String),
    HttpStatus(u16),
    EmptyBody,
    OpaqueBody,
    JsonDecode(String),
    Api {
        /// `status_code` from the body, None when the field was absent
        code: Option<i64>,
        message: String,
        class: ApiErrorClass,
    },
    MissingField(String),
}

impl FailureKind {
    /// Returns true if the upstream asked us to back off harder
    pub fn demands_penalty(&self) -> bool {
        matches!(
            self,
            Self::Api {
                class: ApiErrorClass::RateLimited | ApiErrorClass::AuthRequired,
                ..
            }
        )
    }

    /// Returns true if the raw body should be kept for diagnosis
    pub fn is_undiagnosable(&self) -> bool {
        matches!(self, Self::OpaqueBody | Self::JsonDecode(_))
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {}", e),
            Self::HttpStatus(code) => write!(f, "HTTP status {}", code),
            Self::EmptyBody => write!(f, "empty body"),
            Self::OpaqueBody => write!(f, "opaque body"),
            Self::JsonDecode(e) => write!(f, "JSON decode error: {}", e),
            Self::Api {
                code,
                message,
                class,
            } => {
                let code = code.map_or_else(|| "absent".to_string(), |c| c.to_string());
                write!(f, "API error {} ({:?}): {}", code, class, message)
            }
            Self::MissingField(name) => write!(f, "missing field '{}'", name),
        }
    }
}

/// A failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,

    /// Cursor exposed by a parsed-but-rejected body
    pub cursor_hint: Option<Cursor>,
}

impl FetchFailure {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            cursor_hint: None,
        }
    }
}

/// A successfully parsed page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub has_more: bool,

    /// None when the response carried no usable cursor
    pub cursor: Option<Cursor>,
}

/// Result of one fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Page),
    Failure(FetchFailure),
}

impl FetchOutcome {
    fn failure(kind: FailureKind) -> Self {
        Self::Failure(FetchFailure::new(kind))
    }
}

/// Substrings that identify throttling and login walls in `status_msg`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRules {
    pub rate_limited: Vec<String>,
    pub auth_required: Vec<String>,
}

impl SignalRules {
    /// Classifies a free-text API message, case-insensitively
    pub fn classify(&self, message: &str) -> ApiErrorClass {
        let message = message.to_lowercase();
        let hit = |needles: &[String]| {
            needles
                .iter()
                .any(|n| !n.is_empty() && message.contains(&n.to_lowercase()))
        };

        if hit(&self.rate_limited) {
            ApiErrorClass::RateLimited
        } else if hit(&self.auth_required) {
            ApiErrorClass::AuthRequired
        } else {
            ApiErrorClass::Other
        }
    }
}

impl Default for SignalRules {
    fn default() -> Self {
        Self {
            rate_limited: ["频繁", "frequent", "拦截", "blocked", "too many"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            auth_required: ["登录", "login", "授权", "unauthorized", "authorization"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Classifies a raw response into the failure taxonomy
///
/// Rules apply in order: non-2xx status, blank body, body not starting with `{`,
/// unparsable JSON, `status_code` absent or non-zero, item list absent or not an
/// array.
pub fn classify_body(
    status: u16,
    body: &[u8],
    descriptor: &EndpointDescriptor,
    signals: &SignalRules,
) -> FetchOutcome {
    if !(200..300).contains(&status) {
        return FetchOutcome::failure(FailureKind::HttpStatus(status));
    }

    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return FetchOutcome::failure(FailureKind::EmptyBody);
    }
    if !trimmed.starts_with('{') {
        return FetchOutcome::failure(FailureKind::OpaqueBody);
    }

    let json: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => return FetchOutcome::failure(FailureKind::JsonDecode(e.to_string())),
    };

    let cursor = json.get(&descriptor.cursor_field).and_then(Cursor::from_json);

    let code = json.get("status_code").and_then(as_i64);
    if code != Some(0) {
        let message = json
            .get("status_msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let class = signals.classify(&message);
        return FetchOutcome::Failure(FetchFailure {
            kind: FailureKind::Api {
                code,
                message,
                class,
            },
            cursor_hint: cursor,
        });
    }

    let items = match json.get(&descriptor.item_list_field) {
        Some(Value::Array(items)) => items.clone(),
        _ => {
            return FetchOutcome::Failure(FetchFailure {
                kind: FailureKind::MissingField(descriptor.item_list_field.clone()),
                cursor_hint: cursor,
            })
        }
    };

    let has_more = match json.get("has_more") {
        Some(Value::Bool(b)) => *b,
        Some(other) => as_i64(other).unwrap_or(0) != 0,
        None => false,
    };

    FetchOutcome::Success(Page {
        items,
        has_more,
        cursor,
    })
}

/// Writes bounded body prefixes for failures nobody can classify further
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    dir: PathBuf,
    max_bytes: usize,
}

impl DiagnosticSink {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    /// Path of the artifact for a label
    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("debug_{}.txt", sanitize_file_stem(label)))
    }

    /// Persists a body prefix; errors are logged and dropped
    pub async fn record(&self, label: &str, body: &[u8]) {
        let path = self.path_for(label);
        let prefix = &body[..body.len().min(self.max_bytes)];

        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, prefix).await
        }
        .await;

        match result {
            Ok(()) => debug!("Saved diagnostic body to {}", path.display()),
            Err(e) => warn!("Could not save diagnostic body to {}: {}", path.display(), e),
        }
    }
}

/// One fully prepared request
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,

    /// Scope and cursor label used to name diagnostic artifacts
    pub label: String,
}

/// Executes requests and classifies their outcome
pub struct PageFetcher {
    transport: Arc<dyn HttpTransport>,
    signals: SignalRules,
    diagnostics: Option<DiagnosticSink>,
}

impl PageFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, signals: SignalRules) -> Self {
        Self {
            transport,
            signals,
            diagnostics: None,
        }
    }

    /// Enables diagnostic capture for opaque and undecodable bodies
    pub fn with_diagnostics(mut self, sink: DiagnosticSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Issues one request and classifies the outcome
    ///
    /// # Arguments
    ///
    /// * `request` - URL, headers and diagnostic label
    /// * `timeout` - Timeout for this attempt
    /// * `descriptor` - Field names used to read the body
    pub async fn fetch(
        &self,
        request: &PageRequest,
        timeout: Duration,
        descriptor: &EndpointDescriptor,
    ) -> FetchOutcome {
        let response = match self
            .transport
            .get(&request.url, &request.headers, timeout)
            .await
        {
            Ok(response) => response,
            Err(e) => return FetchOutcome::failure(network_failure(e)),
        };

        let RawResponse { status, body } = response;
        let outcome = classify_body(status, &body, descriptor, &self.signals);

        if let (FetchOutcome::Failure(failure), Some(sink)) = (&outcome, &self.diagnostics) {
            if failure.kind.is_undiagnosable() {
                sink.record(&request.label, &body).await;
            }
        }

        outcome
    }
}

fn network_failure(e: TransportError) -> FailureKind {
    FailureKind::Network(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointKind;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    fn descriptor() -> EndpointDescriptor {
        EndpointDescriptor::for_kind(EndpointKind::Post)
    }

    fn classify(status: u16, body: &str) -> FetchOutcome {
        classify_body(status, body.as_bytes(), &descriptor(), &SignalRules::default())
    }

    fn failure_kind(outcome: FetchOutcome) -> FailureKind {
        match outcome {
            FetchOutcome::Failure(f) => f.kind,
            FetchOutcome::Success(p) => panic!("expected failure, got {:?}", p),
        }
    }

    #[test]
    fn test_http_status_wins_over_body() {
        let kind = failure_kind(classify(503, r#"{"status_code":0,"aweme_list":[]}"#));
        assert_eq!(kind, FailureKind::HttpStatus(503));
    }

    #[test]
    fn test_blank_and_opaque_bodies() {
        assert_eq!(failure_kind(classify(200, "  \n\t")), FailureKind::EmptyBody);
        assert_eq!(
            failure_kind(classify(200, "<html>verify</html>")),
            FailureKind::OpaqueBody
        );
    }

    #[test]
    fn test_json_decode() {
        let kind = failure_kind(classify(200, "{not json"));
        assert!(matches!(kind, FailureKind::JsonDecode(_)));
    }

    #[test]
    fn test_api_error_classes() {
        let kind = failure_kind(classify(200, r#"{"status_code":8,"status_msg":"请求过于频繁"}"#));
        assert_eq!(
            kind,
            FailureKind::Api {
                code: Some(8),
                message: "请求过于频繁".to_string(),
                class: ApiErrorClass::RateLimited,
            }
        );
        assert!(kind.demands_penalty());

        let kind = failure_kind(classify(200, r#"{"status_code":2,"status_msg":"Please LOGIN"}"#));
        assert!(matches!(
            kind,
            FailureKind::Api {
                class: ApiErrorClass::AuthRequired,
                ..
            }
        ));

        let kind = failure_kind(classify(200, r#"{"status_code":5,"status_msg":"odd"}"#));
        assert!(!kind.demands_penalty());
    }

    #[test]
    fn test_auth_signal_does_not_match_unrelated_words() {
        let rules = SignalRules::default();
        assert_eq!(rules.classify("author not found"), ApiErrorClass::Other);
        assert_eq!(rules.classify("authentic content only"), ApiErrorClass::Other);
        assert_eq!(rules.classify("401 Unauthorized"), ApiErrorClass::AuthRequired);
        assert_eq!(rules.classify("missing Authorization"), ApiErrorClass::AuthRequired);
    }

    #[test]
    fn test_absent_status_code_is_api_error() {
        let kind = failure_kind(classify(200, r#"{"aweme_list":[]}"#));
        assert!(matches!(kind, FailureKind::Api { code: None, .. }));
    }

    #[test]
    fn test_missing_field_carries_cursor_hint() {
        let outcome = classify(200, r#"{"status_code":0,"max_cursor":77,"has_more":1}"#);
        match outcome {
            FetchOutcome::Failure(f) => {
                assert_eq!(f.kind, FailureKind::MissingField("aweme_list".to_string()));
                assert_eq!(f.cursor_hint, Some(Cursor::Offset(77)));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        // Not an array counts as missing too
        let kind = failure_kind(classify(200, r#"{"status_code":0,"aweme_list":null}"#));
        assert!(matches!(kind, FailureKind::MissingField(_)));
    }

    #[test]
    fn test_success_page() {
        let outcome = classify(
            200,
            r#"{"status_code":0,"aweme_list":[{"aweme_id":"1"}],"has_more":1,"max_cursor":10}"#,
        );
        assert_eq!(
            outcome,
            FetchOutcome::Success(Page {
                items: vec![json!({"aweme_id": "1"})],
                has_more: true,
                cursor: Some(Cursor::Offset(10)),
            })
        );

        let outcome = classify(200, r#"{"status_code":0,"aweme_list":[],"has_more":false}"#);
        match outcome {
            FetchOutcome::Success(page) => {
                assert!(!page.has_more);
                assert_eq!(page.cursor, None);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_diagnostic_path_is_sanitized() {
        let sink = DiagnosticSink::new("diag", 10);
        assert_eq!(
            sink.path_for("post:MS4w/Lj_cursor_0"),
            PathBuf::from("diag").join("debug_post_MS4w_Lj_cursor_0.txt")
        );
    }

    struct StaticTransport(RawResponse);

    #[async_trait]
    impl HttpTransport for StaticTransport {
        async fn get(
            &self,
            _url: &str,
            _headers: &[(String, String)],
            _timeout: Duration,
        ) -> Result<RawResponse, TransportError> {
            Ok(self.0.clone())
        }
    }

    struct DownTransport;

    #[async_trait]
    impl HttpTransport for DownTransport {
        async fn get(
            &self,
            _url: &str,
            _headers: &[(String, String)],
            _timeout: Duration,
        ) -> Result<RawResponse, TransportError> {
            Err(TransportError::Timeout)
        }
    }

    fn request() -> PageRequest {
        PageRequest {
            url: "http://upstream.test/feed".to_string(),
            headers: vec![],
            label: "post:abc_cursor_0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_opaque_body_is_saved_truncated() {
        let dir = TempDir::new().unwrap();
        let body = "x".repeat(5000);
        let fetcher = PageFetcher::new(
            Arc::new(StaticTransport(RawResponse::new(200, body))),
            SignalRules::default(),
        )
        .with_diagnostics(DiagnosticSink::new(dir.path(), DEFAULT_DIAGNOSTIC_LIMIT));

        let outcome = fetcher
            .fetch(&request(), Duration::from_secs(1), &descriptor())
            .await;
        assert_eq!(failure_kind(outcome), FailureKind::OpaqueBody);

        let saved = std::fs::read(dir.path().join("debug_post_abc_cursor_0.txt")).unwrap();
        assert_eq!(saved.len(), DEFAULT_DIAGNOSTIC_LIMIT);
    }

    #[tokio::test]
    async fn test_unwritable_diagnostics_do_not_fail_fetch() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        // A directory path that runs through a regular file cannot be created
        let fetcher = PageFetcher::new(
            Arc::new(StaticTransport(RawResponse::new(200, "{oops"))),
            SignalRules::default(),
        )
        .with_diagnostics(DiagnosticSink::new(blocker.join("sub"), 10));

        let outcome = fetcher
            .fetch(&request(), Duration::from_secs(1), &descriptor())
            .await;
        assert!(matches!(failure_kind(outcome), FailureKind::JsonDecode(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_network() {
        let fetcher = PageFetcher::new(Arc::new(DownTransport), SignalRules::default());
        let outcome = fetcher
            .fetch(&request(), Duration::from_secs(1), &descriptor())
            .await;
        assert_eq!(
            failure_kind(outcome),
            FailureKind::Network("request timed out".to_string())
        );
    }
}
