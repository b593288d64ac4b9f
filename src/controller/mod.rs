//! Controller abstraction layer
//!
//! The router only needs "grant this device access for N minutes". The
//! `GuestAuthorizer` trait is that seam; `UnifiController` is the real
//! implementation, and tests substitute their own.

pub mod unifi;

pub use unifi::UnifiController;

use crate::models::GuestGrant;
use async_trait::async_trait;
use reqwest::StatusCode;

/// Why a guest could not be authorized
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("login failed ({status}): {body}")]
    LoginFailed { status: StatusCode, body: String },

    #[error("authorization failed ({status}): {body}")]
    AuthorizationFailed { status: StatusCode, body: String },

    #[error("controller request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid controller header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Grants network access to a guest device.
///
/// Implementations hold no per-guest state, so one instance is shared by
/// all request handlers.
#[async_trait]
pub trait GuestAuthorizer: Send + Sync {
    async fn authorize_guest(&self, grant: &GuestGrant) -> Result<(), AuthError>;
}
