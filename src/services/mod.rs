// SPDX-License-Identifier: MIT

//! Outbound collaborators: mail delivery, IP geolocation, TOTP
//! enrollment/verification and OAuth profile retrieval.
//!
//! Each service runs offline when its upstream is not configured, so the
//! whole stack is exercisable in tests without network access.

pub mod geo;
pub mod mailer;
pub mod oauth;
pub mod totp;

pub use geo::GeoService;
pub use mailer::{HttpMailer, MailMessage, Mailer, RecordingMailer};
pub use oauth::OAuthClient;
pub use totp::{TotpEnrollment, TotpService};
