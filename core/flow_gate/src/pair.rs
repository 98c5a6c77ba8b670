//! Endpoint identities and canonical pair keys
//!
//! Connectivity is controlled per unordered pair of endpoints: a packet from
//! A to B and a packet from B to A must resolve to the same key, scoped by
//! the owning application. The key is held structurally as the ordered
//! `(min, max)` endpoint tuple rather than a concatenated string, so two
//! distinct pairs can never collide on an ambiguous boundary.

use std::fmt;

// ============================================================================
// Identities
// ============================================================================

/// Opaque, globally unique identifier of a network endpoint (hardware
/// address style). Totally ordered by its stable string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        EndpointId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        EndpointId(id.to_string())
    }
}

/// Identity of the application that owns installed rules and requested paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        ApplicationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Pair Key
// ============================================================================

/// Canonical, order-independent key for an unordered endpoint pair, scoped
/// by the owning application.
///
/// `PairKey::new(app, a, b) == PairKey::new(app, b, a)` for all `a`, `b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    app: ApplicationId,
    lo: EndpointId,
    hi: EndpointId,
}

impl PairKey {
    /// Build the canonical key for the pair `(a, b)` in either order.
    pub fn new(app: &ApplicationId, a: &EndpointId, b: &EndpointId) -> Self {
        let (lo, hi) = if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };

        PairKey {
            app: app.clone(),
            lo,
            hi,
        }
    }

    pub fn app(&self) -> &ApplicationId {
        &self.app
    }

    /// The pair's endpoints in canonical `(min, max)` order.
    pub fn endpoints(&self) -> (&EndpointId, &EndpointId) {
        (&self.lo, &self.hi)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.app, self.lo, self.hi)
    }
}
