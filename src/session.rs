//! Customer sessions and the registry that owns them.

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Where a session is in its purchase.
///
/// "Funded" is not stored: it depends on the live price of the selected
/// product and is evaluated at vend time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No product selected and no credit.
    Idle,

    /// Coins inserted but no product chosen yet.
    Credited,

    /// A product is chosen; credit may be zero, partial, or enough.
    ProductSelected,
}

/// One customer's in-progress purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    selected_product: Option<String>,
    credit: u64,
    closed: bool,
}

impl Session {
    /// Creates an idle session.
    pub fn new(id: impl Into<String>) -> Self {
        Session {
            id: id.into(),
            selected_product: None,
            credit: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the selected product, if any.
    pub fn selected_product(&self) -> Option<&str> {
        self.selected_product.as_deref()
    }

    /// Money inserted and not yet spent or returned, in pence.
    pub fn credit(&self) -> u64 {
        self.credit
    }

    pub fn state(&self) -> SessionState {
        match (&self.selected_product, self.credit) {
            (Some(_), _) => SessionState::ProductSelected,
            (None, 0) => SessionState::Idle,
            (None, _) => SessionState::Credited,
        }
    }

    /// Whether a reset has paid this session out and removed it from the
    /// registry. A closed session is never credited again.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn select(&mut self, name: &str) {
        self.selected_product = Some(name.to_string());
    }

    pub(crate) fn add_credit(&mut self, pence: u64) {
        self.credit += pence;
    }

    /// Returns the session to `Idle`.
    pub(crate) fn clear(&mut self) {
        self.selected_product = None;
        self.credit = 0;
    }
}

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Locks a session, recovering from poisoning.
///
/// Session fields are only written after every fallible step of an
/// operation has succeeded, so a poisoned session is still consistent.
pub fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Maps caller-supplied session ids to live sessions.
///
/// Ids are opaque: the registry never validates their format. Each session
/// sits behind its own lock so unrelated customers never contend.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mints a fresh id and registers an idle session under it.
    pub fn start_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.map()
            .insert(id.clone(), Arc::new(Mutex::new(Session::new(id.clone()))));
        debug!("Started session {}", id);
        id
    }

    /// Returns the session for `id`, creating an idle one if absent.
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        let mut sessions = self.map();
        Arc::clone(sessions.entry(id.to_string()).or_insert_with(|| {
            debug!("Created session {} on first use", id);
            Arc::new(Mutex::new(Session::new(id)))
        }))
    }

    /// Returns the session for `id` without creating one.
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.map().get(id).cloned()
    }

    /// Removes the session entirely. Returns `false` if it did not exist.
    pub fn destroy(&self, id: &str) -> bool {
        let removed = self.map().remove(id).is_some();
        if removed {
            debug!("Destroyed session {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Sum of credit held by all live sessions, in pence.
    pub fn total_credit(&self) -> u64 {
        let handles: Vec<SessionHandle> = self.map().values().cloned().collect();
        handles.iter().map(|h| lock_session(h).credit()).sum()
    }
}
