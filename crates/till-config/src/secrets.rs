//! Runtime credential resolution.
//!
//! # Contract
//! - Config YAML stores only env var **names** (e.g. `"TILL_API_KEY"`).
//! - Callers invoke [`resolve_credentials`] once at startup.
//! - The returned [`TenantCredentials`] is passed into constructors; never
//!   scatter `std::env::var` calls across the codebase.
//! - `Debug` output redacts values.
//! - Error messages reference the env var **name**, never the value.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::read_str_at;

/// Per-tenant credentials for the remote ordering platform.
///
/// **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct TenantCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .finish()
    }
}

/// Resolve a named environment variable. Returns `None` if the variable is
/// unset or blank. Never returns the value in an error path.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the tenant API key/secret from the environment, using env var
/// names taken from the config JSON (with well-known defaults).
///
/// Both values are required: the engine cannot authenticate either channel
/// without them, so a missing variable is fatal at startup rather than a
/// mid-stream discovery.
pub fn resolve_credentials(config_json: &Value) -> Result<TenantCredentials> {
    let key_var = read_str_at(config_json, "/tenant/api_key_env")
        .unwrap_or_else(|| "TILL_API_KEY".to_string());
    let secret_var = read_str_at(config_json, "/tenant/api_secret_env")
        .unwrap_or_else(|| "TILL_API_SECRET".to_string());

    let Some(api_key) = resolve_env(&key_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (tenant api key) is not set or empty",
            key_var,
        );
    };
    let Some(api_secret) = resolve_env(&secret_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (tenant api secret) is not set or empty",
            secret_var,
        );
    };

    Ok(TenantCredentials {
        api_key,
        api_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_values() {
        let creds = TenantCredentials {
            api_key: "key-value".to_string(),
            api_secret: "secret-value".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("<REDACTED>"));
        assert!(!rendered.contains("key-value"));
        assert!(!rendered.contains("secret-value"));
    }
}
