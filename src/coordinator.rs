//! Per-key request ordering.
//!
//! Every fetch issued for a key gets the next generation number for that key.
//! When it completes, its result is only handed back as [`Outcome::Fresh`] if no
//! newer fetch has been issued for the same key in the meantime. Responses are
//! judged by issuance order, never by arrival order.
//!
//! Two policies exist for a key that already has a request outstanding:
//!
//! * [`Policy::Supersede`] issues the new request and abandons the old one. The old
//!   response is still awaited by whoever issued it but comes back as
//!   [`Outcome::Stale`]. Used for region-derived reads.
//! * [`Policy::Suppress`] refuses to start a second request. Used for writes
//!   (submit, delete) so a double click never sends the same mutation twice.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Supersede,
    Suppress,
}

#[derive(Debug)]
pub enum Outcome<T> {
    /// The latest request for the key succeeded.
    Fresh(T),
    /// A newer request was issued before this one completed; its result was dropped.
    Stale,
    /// Not sent: another request for the key was already in flight.
    Suppressed,
    /// The latest request for the key failed.
    Failed(AppError),
}

impl<T> Outcome<T> {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Outcome::Fresh(_))
    }
}

#[derive(Debug, Default)]
struct KeyState {
    issued: u64,
    in_flight: usize,
}

#[derive(Debug, Default)]
pub struct RequestCoordinator {
    keys: Mutex<HashMap<String, KeyState>>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `request` under `key`, reporting whether its result is still current.
    ///
    /// The in-flight marker taken here is released exactly once, when the request
    /// completes or when this future is dropped before it does.
    pub async fn fetch<T, F, Fut>(&self, key: &str, policy: Policy, request: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(ticket) = self.issue(key, policy) else {
            debug!("Request for {key} already in flight, suppressing duplicate");
            return Outcome::Suppressed;
        };

        let result = request().await;
        let latest = ticket.is_latest();
        drop(ticket);

        match (result, latest) {
            (Ok(value), true) => Outcome::Fresh(value),
            (Err(e), true) => Outcome::Failed(e),
            (Ok(_), false) => {
                debug!("Discarding stale response for {key}");
                Outcome::Stale
            }
            (Err(e), false) => {
                warn!("Superseded request for {key} failed: {e}");
                Outcome::Stale
            }
        }
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|state| state.in_flight > 0)
    }

    /// Generation of the most recently issued request for `key`, 0 if none.
    pub fn latest_generation(&self, key: &str) -> u64 {
        self.lock().get(key).map_or(0, |state| state.issued)
    }

    fn issue(&self, key: &str, policy: Policy) -> Option<Ticket<'_>> {
        let mut keys = self.lock();
        let state = keys.entry(key.to_string()).or_default();
        if policy == Policy::Suppress && state.in_flight > 0 {
            return None;
        }
        state.issued += 1;
        state.in_flight += 1;
        Some(Ticket {
            coordinator: self,
            key: key.to_string(),
            generation: state.issued,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, KeyState>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-flight marker for one issued request.
struct Ticket<'a> {
    coordinator: &'a RequestCoordinator,
    key: String,
    generation: u64,
}

impl Ticket<'_> {
    fn is_latest(&self) -> bool {
        self.coordinator.latest_generation(&self.key) == self.generation
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.coordinator.lock().get_mut(&self.key) {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}
