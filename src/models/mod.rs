// SPDX-License-Identifier: MIT

//! Data models for the auth/session core.

pub mod user;

pub use user::{
    normalize_email, DeviceInfo, GeoLocation, LinkedProvider, OAuthProfile, Provider, Role,
    Session, TwoFa, UnknownProvider, User,
};
