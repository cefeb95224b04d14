//! Capability identifiers and attenuation checks.
//!
//! Capabilities are namespaced strings of the form `action:resource` with
//! wildcards:
//!   - `read:calendar` — read calendar specifically
//!   - `read:*` — read anything
//!   - `execute:deploy:*` — execute deploy to any environment
//!   - `*` — all capabilities (root authority)
//!
//! Delegation attenuation is checked with [`uncovered`]: every delegated
//! capability must be covered by the grantor's set.

use serde::{Deserialize, Serialize};

/// A namespaced capability identifier.
///
/// Serializes as a plain JSON string so capability arrays in signed
/// artifacts stay byte-stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(pub String);

impl Capability {
    /// Create a capability from a URI string.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Check whether this capability covers (grants) a requested one.
    ///
    /// Matching rules:
    /// - `*` matches everything
    /// - `action:*` matches any resource under `action:`
    /// - `action:resource` matches exactly
    /// - `action:resource:*` matches anything under `action:resource:`
    pub fn covers(&self, requested: &Capability) -> bool {
        capability_uri_covers(&self.0, &requested.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Check whether a granted URI covers a requested URI.
///
/// This is the core wildcard matching logic for capability URIs.
pub fn capability_uri_covers(granted: &str, requested: &str) -> bool {
    // Universal wildcard
    if granted == "*" {
        return true;
    }

    // Exact match
    if granted == requested {
        return true;
    }

    // Wildcard suffix matching: "read:*" covers "read:calendar"
    if let Some(prefix) = granted.strip_suffix(":*") {
        if requested == prefix {
            return true;
        }
        if requested.starts_with(prefix) && requested.as_bytes().get(prefix.len()) == Some(&b':') {
            return true;
        }
    }

    false
}

/// Check if a set of granted capabilities covers a single requested one.
pub fn capabilities_cover(granted: &[Capability], requested: &Capability) -> bool {
    granted.iter().any(|cap| cap.covers(requested))
}

/// Capabilities in `requested` that no entry in `granted` covers.
///
/// Empty result means `requested` is a (wildcard-aware) subset of
/// `granted` — the attenuation invariant holds.
pub fn uncovered(granted: &[Capability], requested: &[Capability]) -> Vec<Capability> {
    requested
        .iter()
        .filter(|req| !capabilities_cover(granted, req))
        .cloned()
        .collect()
}
