// SPDX-License-Identifier: MIT

//! Request fingerprinting: client IP, device classification and the
//! HMAC fingerprint bound into every issued token.
//!
//! Enrichment is best-effort and degrades to `"unknown"`; it never fails
//! a request.

use crate::crypto;
use crate::models::{DeviceInfo, GeoLocation};
use axum::http::{header, HeaderMap};

/// Per-request client context threaded explicitly through the handlers
/// (never a mutable bag attached to the request after the fact).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip: String,
    pub device: DeviceInfo,
    pub location: GeoLocation,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip: client_ip(headers),
            device: device_info(headers),
            location: GeoLocation::default(),
        }
    }
}

/// Device/browser/IP hashes embedded as token claims. Comparing these
/// against a later request detects replay from a different device or
/// network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub ip: String,
    pub device: String,
    pub browser: String,
}

impl Fingerprint {
    pub fn compute(secret: &str, ctx: &RequestContext) -> Self {
        Self {
            ip: crypto::hmac_hex(secret, &ctx.ip),
            device: crypto::hmac_hex(secret, &ctx.device.os),
            browser: crypto::hmac_hex(secret, &ctx.device.browser),
        }
    }
}

/// Client IP from forwarding headers, falling back to "unknown".
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Classify the raw User-Agent into device class, OS and browser.
pub fn device_info(headers: &HeaderMap) -> DeviceInfo {
    let ua = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown");

    DeviceInfo {
        device_type: device_type(ua).to_string(),
        os: os_name(ua).to_string(),
        browser: browser_name(ua).to_string(),
        user_agent: ua.to_string(),
    }
}

fn device_type(ua: &str) -> &'static str {
    if ua.contains("bot") || ua.contains("Bot") || ua.contains("spider") {
        "bot"
    } else if ua.contains("iPad") {
        "ipad"
    } else if ua.contains("iPhone") {
        "iphone"
    } else if ua.contains("Android") && ua.contains("Mobile") {
        "mobile"
    } else if ua.contains("Android") {
        "tablet"
    } else if ua.contains("Mobile") {
        "mobile"
    } else if ua.contains("Windows") || ua.contains("Macintosh") || ua.contains("X11") {
        "desktop"
    } else {
        "unknown"
    }
}

fn os_name(ua: &str) -> &'static str {
    if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        "macOS"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("CrOS") {
        "ChromeOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "unknown"
    }
}

fn browser_name(ua: &str) -> &'static str {
    // Order matters: Edge and Opera embed "Chrome", Chrome embeds "Safari".
    if ua.contains("Edg/") {
        "Edge"
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Firefox/") {
        "Firefox"
    } else if ua.contains("Chrome/") {
        "Chrome"
    } else if ua.contains("Safari/") {
        "Safari"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const FIREFOX_MAC: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:127.0) Gecko/20100101 Firefox/127.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
                                 AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 \
                                 Mobile/15E148 Safari/604.1";

    fn headers_with_ua(ua: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(ua).unwrap());
        headers
    }

    #[test]
    fn test_device_classification() {
        let d = device_info(&headers_with_ua(CHROME_WIN));
        assert_eq!(d.device_type, "desktop");
        assert_eq!(d.os, "Windows");
        assert_eq!(d.browser, "Chrome");

        let d = device_info(&headers_with_ua(FIREFOX_MAC));
        assert_eq!(d.os, "macOS");
        assert_eq!(d.browser, "Firefox");

        let d = device_info(&headers_with_ua(SAFARI_IPHONE));
        assert_eq!(d.device_type, "iphone");
        assert_eq!(d.os, "iOS");
        assert_eq!(d.browser, "Safari");
    }

    #[test]
    fn test_missing_user_agent_degrades_to_unknown() {
        let d = device_info(&HeaderMap::new());
        assert_eq!(d.device_type, "unknown");
        assert_eq!(d.os, "unknown");
        assert_eq!(d.browser, "unknown");
        assert_eq!(d.user_agent, "unknown");
    }

    #[test]
    fn test_client_ip_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_fingerprint_differs_per_device() {
        let ctx_a = RequestContext::from_headers(&headers_with_ua(CHROME_WIN));
        let ctx_b = RequestContext::from_headers(&headers_with_ua(FIREFOX_MAC));

        let fp_a = Fingerprint::compute("secret", &ctx_a);
        let fp_b = Fingerprint::compute("secret", &ctx_b);

        assert_ne!(fp_a.device, fp_b.device);
        assert_ne!(fp_a.browser, fp_b.browser);
    }
}
