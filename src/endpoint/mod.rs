//! Endpoint descriptors and request variation
//!
//! Every collection mode is described by plain data: which path to call, which
//! query parameters carry the target and cursor, and which response fields hold
//! the items, their ids and the next cursor. The crawl engine is written once
//! against `EndpointDescriptor` and never branches on the mode itself.

mod catalog;
mod target;

pub use catalog::{HeaderProfile, RequestVariant, RequestVariantCatalog, SessionIdentity};
pub use target::{
    extract_url, parse_target_url, resolve_target, ResolvedTarget, TargetError, TargetKind,
};

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Default upstream origin
pub const DEFAULT_BASE_URL: &str = "https://www.douyin.com";

/// Items requested per page unless configured otherwise
pub const DEFAULT_PAGE_SIZE: u32 = 35;

/// Collection modes supported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    /// Items published by a user
    Post,
    /// Items liked by a user
    Like,
    /// Items belonging to one collection
    Mix,
    /// Items using one music track
    Music,
    /// Collections created by a user
    MixList,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Like => "like",
            Self::Mix => "mix",
            Self::Music => "music",
            Self::MixList => "mix-list",
        }
    }

    pub fn all() -> [Self; 5] {
        [Self::Post, Self::Like, Self::Mix, Self::Music, Self::MixList]
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "like" => Ok(Self::Like),
            "mix" => Ok(Self::Mix),
            "music" => Ok(Self::Music),
            "mix-list" | "mixlist" => Ok(Self::MixList),
            other => Err(format!(
                "unknown mode '{}' (expected post, like, mix, music or mix-list)",
                other
            )),
        }
    }
}

/// Field and parameter names for one collection mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub kind: EndpointKind,

    /// Path appended to the base URL
    pub path: String,

    /// Query parameter carrying the target id
    pub target_param: String,

    /// Query parameter carrying the cursor
    pub cursor_param: String,

    /// Response field holding the item array
    pub item_list_field: String,

    /// Item field holding the item id
    pub id_field: String,

    /// Response field holding the next cursor
    pub cursor_field: String,

    /// Namespace prefix for dedup scopes
    pub scope_prefix: String,

    /// Value of the `count` query parameter
    pub page_size: u32,
}

impl EndpointDescriptor {
    /// Returns the built-in descriptor for a mode
    pub fn for_kind(kind: EndpointKind) -> Self {
        let (path, target_param, cursor_param, item_list_field, id_field) = match kind {
            EndpointKind::Post => (
                "/aweme/v1/web/aweme/post/",
                "sec_user_id",
                "max_cursor",
                "aweme_list",
                "aweme_id",
            ),
            EndpointKind::Like => (
                "/aweme/v1/web/aweme/favorite/",
                "sec_user_id",
                "max_cursor",
                "aweme_list",
                "aweme_id",
            ),
            EndpointKind::Mix => (
                "/aweme/v1/web/mix/aweme/",
                "mix_id",
                "cursor",
                "aweme_list",
                "aweme_id",
            ),
            EndpointKind::Music => (
                "/aweme/v1/web/music/aweme/",
                "music_id",
                "cursor",
                "aweme_list",
                "aweme_id",
            ),
            EndpointKind::MixList => (
                "/aweme/v1/web/mix/list/",
                "sec_user_id",
                "cursor",
                "mix_infos",
                "mix_id",
            ),
        };

        Self {
            kind,
            path: path.to_string(),
            target_param: target_param.to_string(),
            cursor_param: cursor_param.to_string(),
            item_list_field: item_list_field.to_string(),
            id_field: id_field.to_string(),
            // Responses name the cursor field after the request parameter
            cursor_field: cursor_param.to_string(),
            scope_prefix: kind.as_str().to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Same descriptor with a different page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}
