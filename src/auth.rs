//! Refresh-token exchange for a short-lived access token.

use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Credentials;
use crate::error::{Result, SyncError};
use crate::http::{self, ApiResponse};

pub const TOKEN_URL: &str = "https://www.strava.com/oauth/token";

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
    grant_type: &'static str,
}

/// Token endpoint response. Only `access_token` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// The provider may rotate the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Exchanges the configured refresh credential for access tokens.
pub struct TokenProvider {
    client: Client,
    token_url: String,
}

impl TokenProvider {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            token_url: TOKEN_URL.to_string(),
        })
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub async fn refresh(&self, credentials: &Credentials) -> Result<AccessToken> {
        let params = RefreshTokenRequest {
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
            refresh_token: &credentials.refresh_token,
            grant_type: "refresh_token",
        };
        let request = self.client.post(&self.token_url).form(&params);

        let value = match http::send_classified(request, "token refresh").await? {
            ApiResponse::Ok(value) => value,
            ApiResponse::RateLimited => {
                return Err(SyncError::RateLimited {
                    context: "token refresh".to_string(),
                })
            }
        };
        let token = parse_token(value)?;

        if let Some(new_refresh) = &token.refresh_token {
            if new_refresh != &credentials.refresh_token {
                info!("[Auth] Provider rotated the refresh token; update your config");
            }
        }
        Ok(token)
    }
}

fn parse_token(value: serde_json::Value) -> Result<AccessToken> {
    let token: AccessToken = serde_json::from_value(value)
        .map_err(|e| SyncError::malformed("token refresh", e.to_string()))?;
    if token.access_token.is_empty() {
        return Err(SyncError::malformed("token refresh", "empty access_token"));
    }
    Ok(token)
}
