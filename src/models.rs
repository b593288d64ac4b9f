//! Data models for guest authorization

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A guest that arrived through the captive-portal redirect and has not yet
/// submitted the login form.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub token: String,
    /// Client MAC address from the redirect's `id` parameter
    pub device_id: String,
    /// Access point MAC from the redirect's `ap` parameter
    pub ap_id: String,
    /// Only used for expiry
    pub created_at: Instant,
}

/// Body of `POST /api/login`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "cacheId")]
    pub cache_id: String,

    /// Display name the guest typed in
    pub username: String,

    pub email: String,
}

/// What the controller is asked to grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestGrant {
    pub device_id: String,
    pub ap_id: String,
    pub minutes: u32,
}

/// Row written to the audit sink once a pending login is completed
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub token: String,
    pub device_id: String,
    pub ap_id: String,
    pub display_name: String,
    pub email: String,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
}

/// Body of the controller's `/api/auth/login`
#[derive(Debug, Serialize)]
pub struct ControllerLogin<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Body of the controller's `cmd/stamgr` authorize-guest command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizeGuestCmd {
    pub cmd: String,
    pub mac: String,
    pub minutes: u32,
    pub ap_mac: String,
}

impl AuthorizeGuestCmd {
    pub fn for_grant(grant: &GuestGrant) -> Self {
        Self {
            cmd: "authorize-guest".to_string(),
            mac: grant.device_id.clone(),
            minutes: grant.minutes,
            ap_mac: grant.ap_id.clone(),
        }
    }
}
