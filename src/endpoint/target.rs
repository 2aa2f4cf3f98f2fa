//! Target resolution
//!
//! A target may be given as a bare id, a web URL, or share text that embeds a
//! short link. Web URLs name the resource in their path; short links only do so
//! after their redirects have been followed.

use crate::endpoint::EndpointKind;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised while resolving a target
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Failed to follow link {url}: {source}")]
    Redirect {
        url: String,
        source: reqwest::Error,
    },

    #[error("URL does not name a user, collection or music track: {0}")]
    Unrecognized(String),

    #[error("Mode {mode} cannot crawl a {kind} target")]
    ModeMismatch { mode: EndpointKind, kind: TargetKind },
}

/// The kind of resource a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    User,
    Mix,
    Music,
}

impl TargetKind {
    /// Mode crawled when none was requested
    pub fn default_mode(&self) -> EndpointKind {
        match self {
            Self::User => EndpointKind::Post,
            Self::Mix => EndpointKind::Mix,
            Self::Music => EndpointKind::Music,
        }
    }

    /// Returns true if `mode` takes this kind of id as its target
    pub fn accepts(&self, mode: EndpointKind) -> bool {
        match self {
            Self::User => matches!(
                mode,
                EndpointKind::Post | EndpointKind::Like | EndpointKind::MixList
            ),
            Self::Mix => mode == EndpointKind::Mix,
            Self::Music => mode == EndpointKind::Music,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Mix => write!(f, "collection"),
            Self::Music => write!(f, "music"),
        }
    }
}

/// A target id, with its kind when it came from a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub id: String,
    pub kind: Option<TargetKind>,
}

impl ResolvedTarget {
    /// Picks the mode to crawl: the requested one, else the inferred one, else `post`
    pub fn mode(&self, requested: Option<EndpointKind>) -> Result<EndpointKind, TargetError> {
        match (requested, self.kind) {
            (Some(mode), Some(kind)) if !kind.accepts(mode) => {
                Err(TargetError::ModeMismatch { mode, kind })
            }
            (Some(mode), _) => Ok(mode),
            (None, Some(kind)) => Ok(kind.default_mode()),
            (None, None) => Ok(EndpointKind::Post),
        }
    }
}

/// Finds the first http(s) URL inside pasted share text
pub fn extract_url(text: &str) -> Option<&str> {
    let start = ["https://", "http://"]
        .iter()
        .filter_map(|scheme| text.find(scheme))
        .min()?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_graphic())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn is_numeric(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Reads the resource named by a web URL
///
/// Recognizes `/user/{sec_uid}`, `/mix/detail/{id}`, `/collection/{id}` and
/// `/music/{id}`, anywhere in the path (share pages prefix them with `/share`).
///
/// # Examples
///
/// ```
/// use feed_trawl::endpoint::{parse_target_url, TargetKind};
/// use url::Url;
///
/// let url = Url::parse("https://www.douyin.com/collection/7093490319085307918").unwrap();
/// assert_eq!(
///     parse_target_url(&url),
///     Some((TargetKind::Mix, "7093490319085307918".to_string()))
/// );
/// ```
pub fn parse_target_url(url: &Url) -> Option<(TargetKind, String)> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let after = |name: &str, skip: usize| {
        segments
            .iter()
            .position(|s| *s == name)
            .and_then(|i| segments.get(i + 1 + skip))
            .copied()
    };

    if let Some(id) = after("user", 0) {
        return Some((TargetKind::User, id.to_string()));
    }
    if after("mix", 0) == Some("detail") {
        if let Some(id) = after("mix", 1).filter(|id| is_numeric(id)) {
            return Some((TargetKind::Mix, id.to_string()));
        }
    }
    if let Some(id) = after("collection", 0).filter(|id| is_numeric(id)) {
        return Some((TargetKind::Mix, id.to_string()));
    }
    if let Some(id) = after("music", 0).filter(|id| is_numeric(id)) {
        return Some((TargetKind::Music, id.to_string()));
    }

    None
}

/// Turns user input into a target id
///
/// Input without a URL is taken as a bare id. A URL whose path already names the
/// resource is read directly; anything else is fetched and the URL it finally
/// lands on after redirects is read instead.
///
/// # Arguments
///
/// * `client` - HTTP client; must follow redirects
/// * `input` - Id, web URL or share text
/// * `headers` - Browser headers sent with the redirect request
/// * `timeout` - Timeout for the redirect request
pub async fn resolve_target(
    client: &Client,
    input: &str,
    headers: &[(String, String)],
    timeout: Duration,
) -> Result<ResolvedTarget, TargetError> {
    let Some(link) = extract_url(input) else {
        return Ok(ResolvedTarget {
            id: input.trim().to_string(),
            kind: None,
        });
    };

    let url = Url::parse(link).map_err(|e| TargetError::Unrecognized(format!("{}: {}", link, e)))?;
    if let Some((kind, id)) = parse_target_url(&url) {
        return Ok(ResolvedTarget {
            id,
            kind: Some(kind),
        });
    }

    let mut request = client.get(url).timeout(timeout);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request.send().await.map_err(|source| TargetError::Redirect {
        url: link.to_string(),
        source,
    })?;

    let landed = response.url();
    tracing::debug!("Link {} landed on {}", link, landed);

    parse_target_url(landed)
        .map(|(kind, id)| ResolvedTarget {
            id,
            kind: Some(kind),
        })
        .ok_or_else(|| TargetError::Unrecognized(landed.to_string()))
}
