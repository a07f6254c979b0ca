//! Discord OAuth2 support.
//!
//! This module contains only types, URL builders, and JSON parsing.
//! No HTTP calls or DB access — those live in the server adapters.

use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// Discord CDN base for user avatars.
const DISCORD_CDN: &str = "https://cdn.discordapp.com";

// ── Provider Configuration ──────────────────────────────────────────────────

/// OAuth2 provider configuration. Loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    /// Provider identifier: "discord".
    pub id: String,
    /// UI display name: "Discord".
    pub display_name: String,

    // OAuth2 endpoints
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,

    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub scopes: String,
}

/// Create the Discord OAuth2 provider config. Only needs client credentials.
pub fn discord_preset(client_id: String, client_secret: String) -> OAuthProviderConfig {
    OAuthProviderConfig {
        id: "discord".into(),
        display_name: "Discord".into(),
        authorize_url: "https://discord.com/oauth2/authorize".into(),
        token_url: "https://discord.com/api/oauth2/token".into(),
        userinfo_url: "https://discord.com/api/users/@me".into(),
        client_id,
        client_secret,
        scopes: "identify email".into(),
    }
}

/// Normalized identity extracted from the provider's userinfo response.
///
/// Immutable per OAuth exchange — the reconciliation flow reads it, never
/// writes it back.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    /// Provider-side stable user ID (as string).
    pub external_id: String,
    pub username: String,
    pub email: Option<String>,
    /// Resolved avatar image URL (CDN hash or deterministic default).
    pub avatar_url: String,
}

// ── URL Builders (pure functions, no HTTP) ──────────────────────────────────

/// Build the OAuth authorize URL that the user's browser should be redirected to.
pub fn build_authorize_url(config: &OAuthProviderConfig, redirect_uri: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}",
        config.authorize_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&config.scopes),
    )
}

/// Build the OAuth2 token request as `application/x-www-form-urlencoded` pairs.
///
/// Discord's token endpoint only accepts urlencoded form input.
pub fn build_token_request_form(
    config: &OAuthProviderConfig,
    code: &str,
    redirect_uri: &str,
) -> Vec<(String, String)> {
    vec![
        ("client_id".into(), config.client_id.clone()),
        ("client_secret".into(), config.client_secret.clone()),
        ("grant_type".into(), "authorization_code".into()),
        ("code".into(), code.to_string()),
        ("redirect_uri".into(), redirect_uri.to_string()),
    ]
}

/// Parse `access_token` from an OAuth token response body.
pub fn parse_access_token_response(raw: &str) -> Result<String, ServiceError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ServiceError::Internal(
            "OAuth token exchange failed: empty response body".into(),
        ));
    }

    let json: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        ServiceError::Internal(format!("OAuth token exchange failed: invalid JSON: {e}"))
    })?;

    if let Some(token) = json
        .get("access_token")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Ok(token.to_string());
    }

    let err = json.get("error").and_then(|v| v.as_str());
    let err_desc = json.get("error_description").and_then(|v| v.as_str());

    let detail = match (err, err_desc) {
        (Some(e), Some(d)) if !d.is_empty() => format!("{e}: {d}"),
        (Some(e), _) => e.to_string(),
        (_, Some(d)) if !d.is_empty() => d.to_string(),
        _ => "no access_token field in response".to_string(),
    };

    Err(ServiceError::Internal(format!(
        "OAuth token exchange failed: {detail}"
    )))
}

/// Extract a normalized identity from Discord's `/users/@me` response.
///
/// When the account has no custom avatar, Discord serves a deterministic
/// default keyed by `discriminator % 5`.
pub fn extract_identity(userinfo_json: &serde_json::Value) -> Result<ExternalIdentity, ServiceError> {
    let external_id = match &userinfo_json["id"] {
        serde_json::Value::String(s) if !s.is_empty() => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => {
            return Err(ServiceError::Internal(
                "OAuth userinfo missing 'id' field".into(),
            ))
        }
    };

    let username = userinfo_json["username"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::Internal("OAuth userinfo missing 'username' field".into()))?
        .to_string();

    let email = userinfo_json["email"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let avatar_url = match userinfo_json["avatar"].as_str().filter(|s| !s.is_empty()) {
        Some(hash) => format!("{DISCORD_CDN}/avatars/{external_id}/{hash}.png"),
        None => format!(
            "{DISCORD_CDN}/embed/avatars/{}.png",
            default_avatar_index(userinfo_json["discriminator"].as_str())
        ),
    };

    Ok(ExternalIdentity {
        external_id,
        username,
        email,
        avatar_url,
    })
}

/// Default avatar index for accounts without a custom avatar.
fn default_avatar_index(discriminator: Option<&str>) -> u32 {
    discriminator
        .and_then(|d| d.parse::<u32>().ok())
        .unwrap_or(0)
        % 5
}
