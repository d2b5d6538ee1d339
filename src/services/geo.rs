// SPDX-License-Identifier: MIT

//! Best-effort IP geolocation for session records.
//!
//! Lookup failures never fail the caller's request; every error path
//! degrades to the "unknown" location.

use crate::config::Config;
use crate::models::GeoLocation;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

/// IP geolocation client.
pub struct GeoService {
    client: Option<reqwest::Client>,
    api_url: String,
}

impl GeoService {
    pub fn from_config(config: &Config) -> Self {
        match &config.geoip_api_url {
            Some(url) => Self {
                client: reqwest::Client::builder()
                    .timeout(Duration::from_secs(3))
                    .build()
                    .ok(),
                api_url: url.clone(),
            },
            None => {
                tracing::warn!("GEOIP_API_URL not set, geolocation disabled");
                Self {
                    client: None,
                    api_url: String::new(),
                }
            }
        }
    }

    /// Resolve `ip` to a location. Private or unknown addresses and any
    /// upstream failure return the default location.
    pub async fn lookup(&self, ip: &str) -> GeoLocation {
        let Some(client) = &self.client else {
            return GeoLocation::default();
        };
        if ip == "unknown" || is_private(ip) {
            return GeoLocation::default();
        }

        let url = format!("{}/{}", self.api_url.trim_end_matches('/'), ip);
        let response = match client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(ip, status = %r.status(), "Geolocation lookup rejected");
                return GeoLocation::default();
            }
            Err(e) => {
                tracing::debug!(ip, error = %e, "Geolocation lookup failed");
                return GeoLocation::default();
            }
        };

        match response.json::<GeoApiResponse>().await {
            Ok(body) => GeoLocation {
                city: body.city.unwrap_or_else(|| "unknown".to_string()),
                country: body.country.unwrap_or_else(|| "unknown".to_string()),
                lat: body.lat.unwrap_or(0.0),
                lng: body.lon.unwrap_or(0.0),
            },
            Err(e) => {
                tracing::debug!(ip, error = %e, "Geolocation response unreadable");
                GeoLocation::default()
            }
        }
    }
}

fn is_private(ip: &str) -> bool {
    ip == "127.0.0.1"
        || ip == "::1"
        || ip.starts_with("10.")
        || ip.starts_with("192.168.")
        || ip.starts_with("172.16.")
}
