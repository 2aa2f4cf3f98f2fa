//! Records and dedup scopes
//!
//! A `Record` is one item lifted out of a page's item list. Its identity is the
//! upstream id; the raw item object rides along untouched as the payload.

use crate::endpoint::EndpointDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised while turning an upstream item into a record
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("Item is not a JSON object")]
    NotAnObject,

    #[error("Item has no usable '{0}' field")]
    MissingId(String),

    #[error("Item has an out-of-range create_time: {0}")]
    InvalidTimestamp(i64),
}

/// A single item collected from an upstream timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Upstream item id
    pub id: String,

    /// Creation time reported by the upstream
    pub created_at: DateTime<Utc>,

    /// Whether the item is pinned to the top of the timeline
    pub pinned: bool,

    /// The raw item object
    pub payload: Value,
}

impl Record {
    /// Builds a record from a raw item using the descriptor's field names
    ///
    /// Ids may be strings or integers. A missing `create_time` is read as the epoch
    /// and a missing `is_top` as not pinned.
    pub fn from_item(item: Value, descriptor: &EndpointDescriptor) -> Result<Self, RecordError> {
        let object = item.as_object().ok_or(RecordError::NotAnObject)?;

        let id = match object.get(&descriptor.id_field) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(RecordError::MissingId(descriptor.id_field.clone())),
        };

        let create_time = object.get("create_time").and_then(as_i64).unwrap_or(0);
        let created_at = DateTime::from_timestamp(create_time, 0)
            .ok_or(RecordError::InvalidTimestamp(create_time))?;

        let pinned = object
            .get("is_top")
            .map(|v| match v {
                Value::Bool(b) => *b,
                other => as_i64(other).unwrap_or(0) != 0,
            })
            .unwrap_or(false);

        Ok(Self {
            id,
            created_at,
            pinned,
            payload: item,
        })
    }
}

/// Reads an integer that the upstream may send as a number or a numeric string
pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Namespace for dedup identity checks
///
/// Two collections never share keys: "post:abc" and "like:abc" are distinct scopes
/// even though they refer to the same user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupScope {
    prefix: String,
    target: String,
}

impl DedupScope {
    pub fn new(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: target.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// The key stored in the dedup table
    pub fn key(&self) -> String {
        format!("{}:{}", self.prefix, self.target)
    }
}

impl fmt::Display for DedupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.target)
    }
}
