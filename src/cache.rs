//! Pending-login store
//!
//! Bridges the unauthenticated captive-portal redirect to the later form
//! submission. Every operation takes the same mutex; nothing here performs
//! I/O, so the lock is never held across a controller call.
//!
//! A submission `claim`s its token before calling the controller and
//! `consume`s it afterwards. While claimed, the entry stays in the map and
//! still resolves, but no further claim succeeds.

use crate::models::PendingLogin;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug)]
struct Slot {
    login: PendingLogin,
    claimed: bool,
}

#[derive(Debug, Default)]
pub struct PendingLogins {
    entries: Mutex<HashMap<String, Slot>>,
}

impl PendingLogins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new pending login and return its token.
    pub fn create(&self, device_id: impl Into<String>, ap_id: impl Into<String>) -> String {
        let token = Uuid::new_v4().to_string();
        let entry = PendingLogin {
            token: token.clone(),
            device_id: device_id.into(),
            ap_id: ap_id.into(),
            created_at: Instant::now(),
        };
        self.lock().insert(
            token.clone(),
            Slot {
                login: entry,
                claimed: false,
            },
        );
        token
    }

    /// Look a token up without retiring it.
    pub fn resolve(&self, token: &str) -> Option<PendingLogin> {
        self.lock().get(token).map(|slot| slot.login.clone())
    }

    /// Reserve a token for one submission. Only the first caller gets the
    /// entry back; the entry stays stored until `consume`
    /// or the sweeper drops it.
    pub fn claim(&self, token: &str) -> Option<PendingLogin> {
        let mut entries = self.lock();
        let slot = entries.get_mut(token)?;
        if slot.claimed {
            return None;
        }
        slot.claimed = true;
        Some(slot.login.clone())
    }


    /// Retire a token. Returns false if it was already consumed or swept.
    pub fn consume(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    /// Drop every entry older than `max_age`, returning how many went.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        self.sweep_at(Instant::now(), max_age)
    }

    fn sweep_at(&self, now: Instant, max_age: Duration) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|token, slot| {
            let keep = now.saturating_duration_since(slot.login.created_at) <= max_age;
            if !keep {
                tracing::debug!("Purged pending login: {}", token);
            }
            keep
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    // A panic elsewhere cannot leave the map half-written, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run `sweep_expired` every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    store: Arc<PendingLogins>,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Pending-login sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let purged = store.sweep_expired(max_age);
                    if purged > 0 {
                        tracing::info!(
                            "Purged {} expired pending login(s), {} remaining",
                            purged,
                            store.len()
                        );
                    }
                }
            }
        }
    })
}
