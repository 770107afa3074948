//! Per-request access control resolution
//!
//! Authentication lives outside this service. A resolver turns request
//! headers into the caller's [`AccessControl`]; the default grants everything.

use axum::http::HeaderMap;

use crate::domain::AccessControl;

pub trait AccessResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> AccessControl;
}

/// Resolver that allows every topic and field
#[derive(Debug, Default, Clone, Copy)]
pub struct UnrestrictedAccess;

impl AccessResolver for UnrestrictedAccess {
    fn resolve(&self, _headers: &HeaderMap) -> AccessControl {
        AccessControl::unrestricted()
    }
}
