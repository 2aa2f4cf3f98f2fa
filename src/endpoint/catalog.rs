use super::EndpointKind;
use rand::distr::Alphanumeric;
use rand::Rng;

// ===== Query Templates =====
//
// Parameters appended after the target, count and cursor. Ordered; attempt `i`
// uses entry `i % len`.

const POST_QUERIES: &[&[(&str, &str)]] = &[
    &[
        ("device_platform", "webapp"),
        ("aid", "6383"),
        ("version_code", "170400"),
        ("version_name", "17.4.0"),
    ],
    &[("device_platform", "webapp"), ("aid", "6383")],
    &[
        ("device_platform", "webapp"),
        ("version_code", "170400"),
        ("version_name", "17.4.0"),
    ],
    &[("device_platform", "webcast"), ("aid", "6383")],
    &[
        ("device_platform", "webapp"),
        ("aid", "6383"),
        ("version_name", "23.5.0"),
    ],
    &[
        ("device_platform", "webapp"),
        ("aid", "6383"),
        ("version_name", "23.5.0"),
        ("channel", "douyin_web"),
    ],
    &[
        ("device_platform", "webapp"),
        ("aid", "6383"),
        ("channel", "channel_pc_web"),
    ],
    &[
        ("device_platform", "webapp"),
        ("aid", "6383"),
        ("cookie_enabled", "true"),
        ("platform", "PC"),
        ("downlink", "10"),
    ],
];

const LIKE_QUERIES: &[&[(&str, &str)]] = &[
    &[("device_platform", "webapp"), ("aid", "6383")],
    &[
        ("device_platform", "webapp"),
        ("aid", "6383"),
        ("version_code", "170400"),
    ],
];

const DEFAULT_QUERIES: &[&[(&str, &str)]] = &[&[("device_platform", "webapp"), ("aid", "6383")]];

// ===== Header Profiles =====

/// A browser identity presented to the upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderProfile {
    pub user_agent: &'static str,
    pub mobile: bool,
    pub platform: &'static str,
}

const HEADER_PROFILES: &[HeaderProfile] = &[
    HeaderProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        mobile: false,
        platform: "\"macOS\"",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        mobile: false,
        platform: "\"Windows\"",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        mobile: false,
        platform: "\"Linux\"",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1",
        mobile: true,
        platform: "\"iOS\"",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1",
        mobile: true,
        platform: "\"iOS\"",
    },
];

/// Random cookie and header tokens generated once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub ms_token: String,
    pub odin_tt: String,
    pub csrf_token: String,
    pub session_id: String,
    pub secsdk_csrf_token: String,
    pub trace_id: String,
    pub tt_params: String,
}

impl SessionIdentity {
    /// Generates a fresh identity from random alphanumeric tokens
    pub fn generate() -> Self {
        Self {
            ms_token: random_token(107),
            odin_tt: random_token(64),
            csrf_token: random_token(32),
            session_id: random_token(32),
            secsdk_csrf_token: random_token(32),
            trace_id: random_token(32),
            tt_params: random_token(128),
        }
    }

    /// Value of the Cookie header
    pub fn cookie_header(&self) -> String {
        format!(
            "msToken={};odin_tt={};passport_csrf_token={};sessionid={}",
            self.ms_token, self.odin_tt, self.csrf_token, self.session_id
        )
    }
}

fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// One candidate request shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestVariant {
    /// Extra query parameters, in order
    pub query: Vec<(String, String)>,

    /// Full header set for the request
    pub headers: Vec<(String, String)>,
}

/// Ordered request variants for every endpoint kind
///
/// Selection is a pure function of `(kind, attempt)`. The query list and the
/// header list are indexed independently, each modulo its own length, so the two
/// rotations drift against each other across attempts. The catalog owns the
/// session identity; build one per session.
#[derive(Debug, Clone)]
pub struct RequestVariantCatalog {
    identity: SessionIdentity,
    origin: String,
}

impl RequestVariantCatalog {
    /// Creates a catalog around an identity
    ///
    /// # Arguments
    ///
    /// * `identity` - Cookie and header tokens for this session
    /// * `origin` - Upstream origin used for the Referer and Origin headers
    pub fn new(identity: SessionIdentity, origin: impl Into<String>) -> Self {
        Self {
            identity,
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    /// Creates a catalog with a freshly generated identity
    pub fn generate(origin: impl Into<String>) -> Self {
        Self::new(SessionIdentity::generate(), origin)
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Number of distinct query templates for a kind
    pub fn variant_count(kind: EndpointKind) -> usize {
        query_templates(kind).len()
    }

    /// Selects the request variant for an attempt
    pub fn variant(&self, kind: EndpointKind, attempt: u32) -> RequestVariant {
        let attempt = attempt as usize;

        let templates = query_templates(kind);
        let query = templates[attempt % templates.len()]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let profile = &HEADER_PROFILES[attempt % HEADER_PROFILES.len()];

        RequestVariant {
            query,
            headers: self.headers_for(kind, profile),
        }
    }

    fn headers_for(&self, kind: EndpointKind, profile: &HeaderProfile) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = vec![
            ("User-Agent".into(), profile.user_agent.into()),
            ("Accept".into(), "application/json, text/plain, */*".into()),
            ("Accept-Language".into(), "zh-CN,zh;q=0.9,en;q=0.8".into()),
            (
                "sec-ch-ua".into(),
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\"".into(),
            ),
            (
                "sec-ch-ua-mobile".into(),
                if profile.mobile { "?1" } else { "?0" }.into(),
            ),
            ("sec-ch-ua-platform".into(), profile.platform.into()),
            ("Referer".into(), format!("{}/", self.origin)),
            ("Origin".into(), self.origin.clone()),
            ("Cookie".into(), self.identity.cookie_header()),
        ];

        if kind == EndpointKind::Post {
            headers.push((
                "x-secsdk-csrf-token".into(),
                self.identity.secsdk_csrf_token.clone(),
            ));
            headers.push(("x-tt-trace-id".into(), self.identity.trace_id.clone()));
            headers.push(("x-tt-params".into(), self.identity.tt_params.clone()));
        }

        headers
    }
}

fn query_templates(kind: EndpointKind) -> &'static [&'static [(&'static str, &'static str)]] {
    match kind {
        EndpointKind::Post => POST_QUERIES,
        EndpointKind::Like => LIKE_QUERIES,
        EndpointKind::Mix | EndpointKind::Music | EndpointKind::MixList => DEFAULT_QUERIES,
    }
}
