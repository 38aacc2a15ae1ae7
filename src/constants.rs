//! Well-known names, headers and storage limits

/// Source used when a command omits `source`
pub const DEFAULT_SOURCE: &str = "default";

/// Role that bypasses permissions and can never carry one
pub const ADMIN_ROLE: &str = "admin";

/// Prefix that marks a string value as a session-variable reference
pub const SESSION_VARIABLE_PREFIX: &str = "x-hasura-";

// Request headers consulted by the backend-only gate
pub const ADMIN_SECRET_HEADER: &str = "x-hasura-admin-secret";
pub const USE_BACKEND_ONLY_PERMISSIONS_HEADER: &str = "x-hasura-use-backend-only-permissions";
pub const ROLE_HEADER: &str = "x-hasura-role";

// Storage
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;
pub const MAX_DBS: u32 = 4;

/// Longest single key part; parts are length-prefixed with one byte
pub const MAX_KEY_PART_LEN: usize = u8::MAX as usize;

/// Key in the `meta` database holding the next insertion sequence number
pub const NEXT_SEQ_KEY: &str = "next_seq";

/// Is `value` a session-variable reference (`X-Hasura-User-Id` etc.)?
#[inline]
pub fn is_session_variable(value: &str) -> bool {
    value.len() >= SESSION_VARIABLE_PREFIX.len()
        && value.as_bytes()[..SESSION_VARIABLE_PREFIX.len()].eq_ignore_ascii_case(SESSION_VARIABLE_PREFIX.as_bytes())
}
