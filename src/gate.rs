//! Backend-only visibility gate for insert permissions
//!
//! Decided per request, from values the serving layer already has. Pure: no
//! storage access, no side effects.

use sha2::{Digest, Sha256};

/// Per-request inputs to the gate
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    /// `backend_only` of the compiled insert permission
    pub backend_only: bool,
    /// Admin secret presented correctly, or none configured
    pub admin_secret_ok: bool,
    /// `x-hasura-use-backend-only-permissions` present and true
    pub use_backend_only: bool,
    /// Role the permission is being resolved for; does not alter the decision
    pub role: &'a str,
}

/// Is the insert operation visible to this request?
///
/// | backend_only | admin secret ok | header true | visible |
/// |---|---|---|---|
/// | false | any | any | yes |
/// | true | false | any | no |
/// | true | true | false | no |
/// | true | true | true | yes |
#[inline]
pub fn backend_only_visible(input: GateInput) -> bool {
    !input.backend_only || (input.admin_secret_ok && input.use_backend_only)
}

/// True when no secret is configured, or the presented one matches
pub fn admin_secret_ok(configured: Option<&str>, presented: Option<&str>) -> bool {
    match (configured, presented) {
        (None, _) => true,
        (Some(_), None) => false,
        // Compare digests so the comparison time does not depend on a shared prefix
        (Some(c), Some(p)) => Sha256::digest(c.as_bytes()) == Sha256::digest(p.as_bytes()),
    }
}

/// Header booleans: `true|t|yes|y|1` (any case) are true, everything else false
pub fn parse_header_bool(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "t" | "yes" | "y" | "1")
    )
}
