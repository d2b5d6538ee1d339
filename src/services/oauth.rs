// SPDX-License-Identifier: MIT

//! OAuth profile retrieval.
//!
//! The engine is provider-agnostic past this module: each provider's
//! userinfo payload is reduced to the one normalized [`OAuthProfile`]
//! shape, and everything downstream (account creation, linking, session
//! issuance) sees only that.

use crate::error::{AppError, Result};
use crate::models::{OAuthProfile, Provider};
use serde_json::Value;

/// Fetches and normalizes provider profiles. `new_mock` skips the
/// network and returns a fixed profile.
pub struct OAuthClient {
    client: Option<reqwest::Client>,
    mock_profile: Option<OAuthProfile>,
}

impl OAuthClient {
    pub fn new() -> Self {
        Self {
            client: Some(reqwest::Client::new()),
            mock_profile: None,
        }
    }

    pub fn new_mock(profile: OAuthProfile) -> Self {
        Self {
            client: None,
            mock_profile: Some(profile),
        }
    }

    /// Fetch the provider profile using the provider access token the
    /// client obtained in its authorization flow.
    pub async fn fetch_profile(
        &self,
        provider: Provider,
        provider_token: &str,
    ) -> Result<OAuthProfile> {
        if let Some(profile) = &self.mock_profile {
            return Ok(profile.clone());
        }
        let Some(client) = &self.client else {
            return Err(AppError::Upstream("OAuth client not configured".to_string()));
        };

        let url = userinfo_url(provider)?;
        let response = client
            .get(url)
            .bearer_auth(provider_token)
            // GitHub rejects requests without a User-Agent.
            .header(reqwest::header::USER_AGENT, "parceld")
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("OAuth userinfo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Unauthorized(
                "Could not verify your identity with the selected provider.".to_string(),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("OAuth userinfo unreadable: {e}")))?;

        extract_profile(provider, &body)
    }
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

fn userinfo_url(provider: Provider) -> Result<&'static str> {
    match provider {
        Provider::Google => Ok("https://www.googleapis.com/oauth2/v2/userinfo"),
        Provider::Github => Ok("https://api.github.com/user"),
        Provider::Discord => Ok("https://discord.com/api/users/@me"),
        Provider::Facebook => {
            Ok("https://graph.facebook.com/me?fields=email,first_name,last_name,picture")
        }
        Provider::Twitter => Ok("https://api.twitter.com/2/users/me?user.fields=profile_image_url"),
        Provider::Linkedin => Ok("https://api.linkedin.com/v2/userinfo"),
        Provider::Jwt => Err(AppError::Validation(
            "Unsupported identity provider".to_string(),
        )),
    }
}

fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

fn split_name(full: &str) -> (String, String) {
    match full.trim().rsplit_once(' ') {
        Some((given, family)) => (given.to_string(), family.to_string()),
        None => (full.trim().to_string(), String::new()),
    }
}

/// Reduce a provider userinfo payload to the normalized profile tuple.
pub fn extract_profile(provider: Provider, body: &Value) -> Result<OAuthProfile> {
    let missing_email = || {
        AppError::Validation(
            "Your provider account has no verified email address. Add one and try again."
                .to_string(),
        )
    };

    let profile = match provider {
        Provider::Google => OAuthProfile {
            email: str_field(body, "email").ok_or_else(missing_email)?.to_string(),
            verified: body
                .get("verified_email")
                .or_else(|| body.get("email_verified"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            given_name: str_field(body, "given_name").unwrap_or_default().to_string(),
            family_name: str_field(body, "family_name").unwrap_or_default().to_string(),
            avatar_url: str_field(body, "picture").map(String::from),
        },
        Provider::Github => {
            let (given_name, family_name) =
                split_name(str_field(body, "name").unwrap_or_default());
            OAuthProfile {
                email: str_field(body, "email").ok_or_else(missing_email)?.to_string(),
                // GitHub only exposes verified primary emails here.
                verified: true,
                given_name,
                family_name,
                avatar_url: str_field(body, "avatar_url").map(String::from),
            }
        }
        Provider::Discord => {
            let (given_name, family_name) = split_name(
                str_field(body, "global_name")
                    .or_else(|| str_field(body, "username"))
                    .unwrap_or_default(),
            );
            OAuthProfile {
                email: str_field(body, "email").ok_or_else(missing_email)?.to_string(),
                verified: body
                    .get("verified")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                given_name,
                family_name,
                avatar_url: None,
            }
        }
        Provider::Facebook => OAuthProfile {
            email: str_field(body, "email").ok_or_else(missing_email)?.to_string(),
            verified: true,
            given_name: str_field(body, "first_name").unwrap_or_default().to_string(),
            family_name: str_field(body, "last_name").unwrap_or_default().to_string(),
            avatar_url: body
                .pointer("/picture/data/url")
                .and_then(Value::as_str)
                .map(String::from),
        },
        Provider::Twitter => {
            let data = body.get("data").unwrap_or(body);
            let (given_name, family_name) =
                split_name(str_field(data, "name").unwrap_or_default());
            OAuthProfile {
                email: str_field(data, "email").ok_or_else(missing_email)?.to_string(),
                verified: true,
                given_name,
                family_name,
                avatar_url: str_field(data, "profile_image_url").map(String::from),
            }
        }
        Provider::Linkedin => OAuthProfile {
            email: str_field(body, "email").ok_or_else(missing_email)?.to_string(),
            verified: body
                .get("email_verified")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            given_name: str_field(body, "given_name").unwrap_or_default().to_string(),
            family_name: str_field(body, "family_name").unwrap_or_default().to_string(),
            avatar_url: str_field(body, "picture").map(String::from),
        },
        Provider::Jwt => {
            return Err(AppError::Validation(
                "Unsupported identity provider".to_string(),
            ))
        }
    };

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_google_profile() {
        let body = json!({
            "email": "ada@gmail.com",
            "verified_email": true,
            "given_name": "Ada",
            "family_name": "Lovelace",
            "picture": "https://lh3.example/photo.jpg"
        });

        let profile = extract_profile(Provider::Google, &body).unwrap();
        assert_eq!(profile.email, "ada@gmail.com");
        assert!(profile.verified);
        assert_eq!(profile.given_name, "Ada");
        assert_eq!(profile.family_name, "Lovelace");
        assert_eq!(profile.avatar_url.as_deref(), Some("https://lh3.example/photo.jpg"));
    }

    #[test]
    fn test_github_profile_splits_name() {
        let body = json!({
            "email": "ada@example.com",
            "name": "Ada King Lovelace",
            "avatar_url": "https://avatars.example/1"
        });

        let profile = extract_profile(Provider::Github, &body).unwrap();
        assert_eq!(profile.given_name, "Ada King");
        assert_eq!(profile.family_name, "Lovelace");
        assert!(profile.verified);
    }

    #[test]
    fn test_missing_email_rejected() {
        let body = json!({"name": "Ada", "avatar_url": "x"});
        assert!(extract_profile(Provider::Github, &body).is_err());
    }

    #[test]
    fn test_twitter_nested_data() {
        let body = json!({
            "data": {
                "email": "ada@example.com",
                "name": "Ada Lovelace",
                "profile_image_url": "https://pbs.example/p.jpg"
            }
        });

        let profile = extract_profile(Provider::Twitter, &body).unwrap();
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.family_name, "Lovelace");
    }

    #[tokio::test]
    async fn test_mock_client_returns_fixture() {
        let fixture = OAuthProfile {
            email: "ada@example.com".to_string(),
            verified: true,
            given_name: "Ada".to_string(),
            family_name: "Lovelace".to_string(),
            avatar_url: None,
        };

        let client = OAuthClient::new_mock(fixture.clone());
        let profile = client.fetch_profile(Provider::Google, "ignored").await.unwrap();
        assert_eq!(profile.email, fixture.email);
    }
}
