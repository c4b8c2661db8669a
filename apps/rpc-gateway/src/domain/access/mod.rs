//! Access Policy
//!
//! Maps a consumer identity to the set of methods it may invoke. The table is
//! parsed once from JSON at startup and is immutable afterwards, so lookups
//! need no synchronization.
//!
//! # Table Format
//!
//! ```json
//! {
//!     "logger": ["/gateway.v1.Admin/Logging"],
//!     "stat": ["/gateway.v1.Admin/Statistics"],
//!     "biz_user": ["/gateway.v1.Biz/Check", "/gateway.v1.Biz/Add"],
//!     "biz_admin": ["/gateway.v1.Biz/*"]
//! }
//! ```
//!
//! # Matching
//!
//! In [`MethodMatching::Segment`] mode (the default) only the trailing method
//! segment is compared, on both the pattern side and the method side, so
//! `"/gateway.v1.Biz/Check"`, `"Check"` and `"/other.Svc/Check"` all name the
//! same method. A trailing `*` segment allows everything.
//!
//! [`MethodMatching::FullPath`] compares complete method paths instead:
//! `"*"` allows everything, `"/pkg.Svc/*"` allows every method of one service
//! and any other pattern must equal the full path.

use std::collections::HashMap;

// =============================================================================
// Matching Mode
// =============================================================================

/// How method patterns are compared against incoming method paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodMatching {
    /// Compare only the trailing method segment.
    #[default]
    Segment,
    /// Compare complete `/service/method` paths.
    FullPath,
}

impl MethodMatching {
    /// Parse a matching mode from a string.
    ///
    /// Unrecognized values fall back to [`MethodMatching::Segment`].
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "full" | "full_path" | "fullpath" => Self::FullPath,
            _ => Self::Segment,
        }
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Segment => "segment",
            Self::FullPath => "full",
        }
    }
}

// =============================================================================
// Method Patterns
// =============================================================================

/// A single allowed-method entry for one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodPattern {
    /// Wildcard: every method is allowed.
    Any,
    /// A method segment (segment mode) or full method path (full-path mode).
    Exact(String),
    /// Every method under a service prefix such as `/pkg.Svc/`.
    Service(String),
}

impl MethodPattern {
    /// Parse a raw pattern string under the given matching mode.
    ///
    /// Returns `None` for patterns that can never match anything.
    #[must_use]
    pub fn parse(raw: &str, matching: MethodMatching) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        match matching {
            MethodMatching::Segment => match method_segment(raw) {
                "" => None,
                "*" => Some(Self::Any),
                segment => Some(Self::Exact(segment.to_string())),
            },
            MethodMatching::FullPath => {
                if raw == "*" {
                    Some(Self::Any)
                } else if let Some(prefix) = raw.strip_suffix('*') {
                    prefix
                        .ends_with('/')
                        .then(|| Self::Service(prefix.to_string()))
                } else {
                    Some(Self::Exact(raw.to_string()))
                }
            }
        }
    }

    /// Check whether this pattern admits `method` under the given mode.
    #[must_use]
    pub fn matches(&self, method: &str, matching: MethodMatching) -> bool {
        match (self, matching) {
            (Self::Any, _) => true,
            (Self::Exact(segment), MethodMatching::Segment) => method_segment(method) == segment,
            (Self::Exact(path), MethodMatching::FullPath) => method == path,
            (Self::Service(prefix), _) => method
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/')),
        }
    }
}

/// Trailing segment of a method path: `"/pkg.Svc/Check"` becomes `"Check"`.
#[must_use]
pub fn method_segment(method: &str) -> &str {
    method.rsplit('/').next().unwrap_or(method)
}

// =============================================================================
// Access Policy
// =============================================================================

/// Immutable consumer → allowed-methods table.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    table: HashMap<String, Vec<MethodPattern>>,
    matching: MethodMatching,
}

impl AccessPolicy {
    /// Parse a JSON access table using segment matching.
    ///
    /// # Errors
    ///
    /// Returns `AccessTableError` if the JSON is malformed, a pattern is not a
    /// string, or an entry is empty.
    pub fn from_json(src: &str) -> Result<Self, AccessTableError> {
        Self::from_json_with(src, MethodMatching::default())
    }

    /// Parse a JSON access table using the given matching mode.
    ///
    /// # Errors
    ///
    /// Returns `AccessTableError` if the JSON is malformed, a pattern is not a
    /// string, or an entry is empty.
    pub fn from_json_with(src: &str, matching: MethodMatching) -> Result<Self, AccessTableError> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(src)?;
        Self::from_entries(raw, matching)
    }

    /// Build a policy from already-decoded entries.
    ///
    /// # Errors
    ///
    /// Returns `AccessTableError` if a consumer name or pattern is empty.
    pub fn from_entries<I, P>(entries: I, matching: MethodMatching) -> Result<Self, AccessTableError>
    where
        I: IntoIterator<Item = (String, P)>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let mut table = HashMap::new();

        for (consumer, patterns) in entries {
            if consumer.trim().is_empty() {
                return Err(AccessTableError::EmptyConsumer);
            }

            let mut parsed = Vec::new();
            for pattern in patterns {
                let pattern = pattern.as_ref();
                let Some(p) = MethodPattern::parse(pattern, matching) else {
                    return Err(AccessTableError::InvalidPattern {
                        consumer,
                        pattern: pattern.to_string(),
                    });
                };
                parsed.push(p);
            }

            table.insert(consumer, parsed);
        }

        Ok(Self { table, matching })
    }

    /// Check whether `consumer` may invoke `method`.
    ///
    /// Unknown consumers are denied rather than treated as an error.
    #[must_use]
    pub fn allowed(&self, consumer: &str, method: &str) -> bool {
        self.table.get(consumer).is_some_and(|patterns| {
            patterns
                .iter()
                .any(|pattern| pattern.matches(method, self.matching))
        })
    }

    /// Get the matching mode.
    #[must_use]
    pub const fn matching(&self) -> MethodMatching {
        self.matching
    }

    /// Number of consumers in the table.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.table.len()
    }

    /// Check if the table has no consumers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Patterns registered for a consumer.
    #[must_use]
    pub fn patterns(&self, consumer: &str) -> Option<&[MethodPattern]> {
        self.table.get(consumer).map(Vec::as_slice)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Access table parse errors.
#[derive(Debug, thiserror::Error)]
pub enum AccessTableError {
    /// The table is not a JSON object of string arrays.
    #[error("access table is not valid: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A consumer key is empty.
    #[error("access table contains an empty consumer name")]
    EmptyConsumer,

    /// A pattern can never match.
    #[error("consumer {consumer:?} has invalid method pattern {pattern:?}")]
    InvalidPattern {
        /// Consumer owning the pattern.
        consumer: String,
        /// The rejected pattern.
        pattern: String,
    },
}

// =============================================================================
// Tests
// =============================================================================
