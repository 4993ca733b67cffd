//! # Attribution State
//!
//! Holds the shopper's attribution session, the link between a code click
//! and a later purchase, and persists it through a [`LocalStore`].
//!
//! ## Lifetime
//! ```text
//! click ──► replace(session) ──► saved
//!                                  │
//!            restart ──► load ──► expired? ──yes──► cleared, absent
//!                                  │no
//!                                  ▼
//!                          current(now) ──► purchase ──► retire() ──► cleared
//! ```
//!
//! An expired session is never returned: [`AttributionState::current`]
//! drops and clears it on first sight.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::store::{LocalStore, MemoryStore};
use lys_core::attribution::{self, AttributionSession};

#[derive(Debug, Clone)]
pub struct AttributionState {
    session: Arc<Mutex<Option<AttributionSession>>>,
    store: Arc<dyn LocalStore<AttributionSession>>,
}

impl AttributionState {
    /// Restores the stored session, discarding it when expired at `now`.
    pub fn new(store: Arc<dyn LocalStore<AttributionSession>>, now: DateTime<Utc>) -> Self {
        let stored = match store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Stored attribution session unreadable, discarding");
                None
            }
        };

        let had_session = stored.is_some();
        let session = attribution::restore(stored, now);
        if had_session && session.is_none() {
            debug!("Stored attribution session expired");
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to clear expired attribution session");
            }
        }

        AttributionState {
            session: Arc::new(Mutex::new(session)),
            store,
        }
    }

    pub fn in_memory(now: DateTime<Utc>) -> Self {
        Self::new(Arc::new(MemoryStore::<AttributionSession>::new()), now)
    }

    /// The unexpired session, if any.
    pub fn current(&self, now: DateTime<Utc>) -> Option<AttributionSession> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(slot.as_ref(), Some(s) if s.is_expired(now)) {
            debug!("Attribution session expired");
            *slot = None;
            self.clear_store();
        }
        slot.clone()
    }

    /// Stores `session`, replacing any previous one.
    pub fn replace(&self, session: AttributionSession) {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.store.save(&session) {
            warn!(error = %e, "Failed to persist attribution session");
        }
        *slot = Some(session);
    }

    /// Applies `f` to the held session (if any) and saves the result.
    pub fn update<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut AttributionSession) -> R,
    {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let session = slot.as_mut()?;
        let result = f(session);
        if let Err(e) = self.store.save(session) {
            warn!(error = %e, "Failed to persist attribution session");
        }
        Some(result)
    }

    /// Forgets the session, e.g. after the purchase it attributed.
    pub fn retire(&self) {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        self.clear_store();
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear attribution session");
        }
    }
}
