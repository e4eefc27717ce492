//! Role configuration and authentication state types.
//!
//! The auth state file is the persisted shape produced by recording a
//! logged-in session elsewhere: cookies plus origin-scoped localStorage
//! entries.
//!
//! ```json
//! {
//!   "cookies": [{"name": "sid", "value": "…", "domain": "example.com",
//!                "path": "/", "httpOnly": true, "secure": true}],
//!   "origins": [{"origin": "https://example.com",
//!                "localStorage": [{"name": "token", "value": "…"}]}]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use agentlens_cdp::protocol::storage::{CookieParam, CookieSameSite};

use crate::bridge::BridgeLimits;

/// Configuration for one persona.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfig {
    /// Path to the auth state file. Absent means the role runs
    /// unauthenticated without warnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_path: Option<PathBuf>,
    /// URL to open on first selection of the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_url: Option<String>,
    /// When set, a failed auth load poisons context creation instead of
    /// degrading to unauthenticated.
    #[serde(default)]
    pub auth_required: bool,
    /// Bridge limit overrides for this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BridgeLimits>,
}

/// Cookie SameSite policy as written in auth state files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Strict enforcement.
    Strict,
    /// Lax enforcement.
    Lax,
    /// No enforcement.
    None,
}

impl From<SameSite> for CookieSameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Strict => Self::Strict,
            SameSite::Lax => Self::Lax,
            SameSite::None => Self::None,
        }
    }
}

/// A cookie in an auth state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Cookie path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expiry, seconds since the unix epoch. Session cookie when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// HttpOnly flag.
    #[serde(default)]
    pub http_only: bool,
    /// Secure flag.
    #[serde(default)]
    pub secure: bool,
    /// SameSite policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

impl AuthCookie {
    /// Convert into the protocol cookie parameter.
    pub fn to_param(&self) -> CookieParam {
        CookieParam {
            name: self.name.clone(),
            value: self.value.clone(),
            url: None,
            domain: self.domain.clone(),
            path: self.path.clone(),
            secure: Some(self.secure),
            http_only: Some(self.http_only),
            same_site: self.same_site.map(Into::into),
            expires: self.expires,
        }
    }
}

/// One localStorage entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageEntry {
    /// Storage key.
    pub name: String,
    /// Storage value.
    pub value: String,
}

/// localStorage entries scoped to one origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOrigin {
    /// Origin URL, e.g. `https://example.com`.
    pub origin: String,
    /// Entries to write after navigating to the origin.
    #[serde(default)]
    pub local_storage: Vec<LocalStorageEntry>,
}

/// Persisted authentication state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    /// Cookies, installed first.
    #[serde(default)]
    pub cookies: Vec<AuthCookie>,
    /// Origin-scoped localStorage, written per origin.
    #[serde(default)]
    pub origins: Vec<AuthOrigin>,
}

impl AuthState {
    /// Load auth state from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save auth state to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path.as_ref(), content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_state_parses_the_documented_shape() {
        let json = r#"{
            "cookies": [{
                "name": "sid", "value": "abc", "domain": "example.com",
                "path": "/", "httpOnly": true, "secure": true,
                "sameSite": "Lax", "expires": 1893456000.0
            }],
            "origins": [{
                "origin": "https://example.com",
                "localStorage": [{"name": "token", "value": "xyz"}]
            }]
        }"#;
        let state: AuthState = serde_json::from_str(json).unwrap();
        assert_eq!(state.cookies.len(), 1);
        let cookie = &state.cookies[0];
        assert_eq!(cookie.name, "sid");
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site, Some(SameSite::Lax));
        assert_eq!(state.origins[0].local_storage[0].name, "token");
    }

    #[test]
    fn auth_state_tolerates_missing_sections() {
        let state: AuthState = serde_json::from_str("{}").unwrap();
        assert!(state.cookies.is_empty());
        assert!(state.origins.is_empty());
    }

    #[test]
    fn cookie_converts_to_protocol_param() {
        let cookie = AuthCookie {
            name: "sid".to_string(),
            value: "abc".to_string(),
            domain: Some("example.com".to_string()),
            path: Some("/".to_string()),
            expires: None,
            http_only: true,
            secure: false,
            same_site: Some(SameSite::Strict),
        };
        let param = cookie.to_param();
        assert_eq!(param.name, "sid");
        assert_eq!(param.http_only, Some(true));
        assert_eq!(param.same_site, Some(CookieSameSite::Strict));
    }

    #[tokio::test]
    async fn auth_state_roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let state = AuthState {
            cookies: vec![AuthCookie {
                name: "a".to_string(),
                value: "b".to_string(),
                domain: None,
                path: None,
                expires: None,
                http_only: false,
                secure: false,
                same_site: None,
            }],
            origins: Vec::new(),
        };
        state.save(&path).await.unwrap();
        let loaded = AuthState::load(&path).await.unwrap();
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].name, "a");
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        assert!(AuthState::load("/nonexistent/auth.json").await.is_err());
    }

    #[test]
    fn role_config_parses_camel_case() {
        let config: RoleConfig = serde_json::from_str(
            r#"{"authPath": "/tmp/a.json", "defaultUrl": "https://x.test", "authRequired": true}"#,
        )
        .unwrap();
        assert!(config.auth_required);
        assert_eq!(config.default_url.as_deref(), Some("https://x.test"));
    }
}
