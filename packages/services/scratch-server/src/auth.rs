use std::collections::HashMap;

use scratch_core::error::{Result, ServiceError};
use scratch_core::Config;

/// Bearer-token tenant resolution (`§4.A`). When auth is disabled every
/// request resolves to `implicit_default_tenant()`; when enabled, a missing
/// or unrecognized token fails with `UNAUTHORIZED` rather than falling back.
pub struct TenantRegistry {
    enabled: bool,
    token_to_principal: HashMap<String, String>,
    implicit_default_tenant: String,
}

impl TenantRegistry {
    pub fn from_config(cfg: &Config) -> Self {
        TenantRegistry {
            enabled: cfg.enable_auth,
            token_to_principal: cfg.token_registry(),
            implicit_default_tenant: cfg.implicit_default_tenant().to_string(),
        }
    }

    pub fn resolve_bearer(&self, token: Option<&str>) -> Result<String> {
        if !self.enabled {
            return Ok(self.implicit_default_tenant.clone());
        }
        let token = token.ok_or(ServiceError::Unauthorized)?;
        self.token_to_principal
            .get(token)
            .cloned()
            .ok_or(ServiceError::Unauthorized)
    }
}

/// Parses `Authorization: Bearer <token>` (case-insensitive scheme), the
/// only credential shape this server accepts over HTTP/SSE.
pub fn bearer_token_from_header(header_value: Option<&str>) -> Option<&str> {
    let value = header_value?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_parses_case_insensitive_scheme() {
        assert_eq!(bearer_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token_from_header(Some("bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token_from_header(Some("Basic abc123")), None);
        assert_eq!(bearer_token_from_header(None), None);
    }
}
