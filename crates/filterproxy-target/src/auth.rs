use std::{fmt, path::Path};

use filterproxy_common::error::{ProxyError, Result};
use serde::Deserialize;

/// Token mounted into every pod running under a service account.
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum AuthMode {
    #[default]
    #[serde(rename = "", alias = "None", alias = "none")]
    None,
    #[serde(rename = "Bearer", alias = "bearer")]
    Bearer,
    #[serde(rename = "Kubernetes", alias = "kubernetes")]
    Kubernetes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type", default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub token: Option<String>,
}

/// Bearer token sent to upstream exporters.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

pub fn resolve_credential(
    auth: &AuthConfig,
    service_account_token: &Path,
) -> Result<Option<Credential>> {
    match auth.mode {
        AuthMode::None => Ok(None),
        AuthMode::Bearer => {
            let token = auth
                .token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .ok_or_else(|| {
                    ProxyError::Credential("bearer auth requires a token".to_string())
                })?;
            Ok(Some(Credential::bearer(token)))
        }
        AuthMode::Kubernetes => {
            let token = std::fs::read_to_string(service_account_token).map_err(|err| {
                ProxyError::Credential(format!(
                    "failed to read service account token {}: {err}",
                    service_account_token.display()
                ))
            })?;
            let token = token.trim();
            if token.is_empty() {
                return Err(ProxyError::Credential(format!(
                    "service account token {} is empty",
                    service_account_token.display()
                )));
            }
            Ok(Some(Credential::bearer(token)))
        }
    }
}
