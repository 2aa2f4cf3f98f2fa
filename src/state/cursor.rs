use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Opaque continuation token for a paginated listing
///
/// Timelines keyed by time or offset use a numeric cursor; some listings hand out
/// string tokens instead. The engine never interprets a token beyond the degraded
/// forward estimate, which only numeric cursors support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Cursor {
    Offset(i64),
    Token(String),
}

impl Cursor {
    /// The cursor every session starts from
    pub fn start() -> Self {
        Self::Offset(0)
    }

    /// Reads a cursor out of a response field
    ///
    /// Integers become offsets and non-empty strings become tokens. Anything else
    /// (null, bool, empty string) means the response exposed no cursor.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Offset),
            Value::String(s) if !s.is_empty() => Some(Self::Token(s.clone())),
            _ => None,
        }
    }

    /// The value sent back in the cursor query parameter
    pub fn query_value(&self) -> String {
        match self {
            Self::Offset(n) => n.to_string(),
            Self::Token(s) => s.clone(),
        }
    }

    /// Best-effort guess at the next page's cursor
    ///
    /// Only meaningful for numeric cursors; token cursors return None.
    pub fn estimate_forward(&self, step: i64) -> Option<Self> {
        match self {
            Self::Offset(n) => Some(Self::Offset(n.saturating_add(step))),
            Self::Token(_) => None,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query_value())
    }
}
