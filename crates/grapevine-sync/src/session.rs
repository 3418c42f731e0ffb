//! Per-space sync session state.
//!
//! A session is born when we broadcast a `sync-request`, collects candidates
//! as `sync-info` replies arrive, selects the best candidate when a timer
//! fires, and dies on the final delta, cancellation, or expiry. Expired
//! sessions are reaped lazily on access.
//!
//! Timers are tokio tasks owned by the session: scheduling replaces any
//! existing timer, and every terminal transition aborts the outstanding one.
//! Errors from the host's initiate hook are logged and isolated; they never
//! change session state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;

use grapevine_core::{InboxAddress, SpaceId, Summary, Timestamp};

/// A peer that answered our `sync-request` with a `sync-info`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCandidate {
    /// Where to send the `sync-initiate`.
    pub inbox_address: InboxAddress,
    /// What the candidate claims to hold.
    pub summary: Summary,
}

/// Host callback invoked when a sync target has been selected.
pub type InitiateSyncHook = Arc<
    dyn Fn(&SpaceId, &SyncCandidate) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

/// Timing configuration for sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to collect candidates after a `sync-request`.
    pub request_expiry: Duration,
    /// How long to keep waiting once the first candidate has arrived.
    pub aggressive_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_expiry: Duration::from_secs(30),
            aggressive_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Selected,
    Syncing,
}

struct Session {
    expiry: Timestamp,
    phase: Phase,
    candidates: Vec<SyncCandidate>,
    in_progress: bool,
    sync_target: Option<InboxAddress>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every schedule so stale timers become no-ops.
    timer_generation: u64,
}

impl Session {
    fn clear_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.clear_timer();
    }
}

/// Tracks one session per space.
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<SpaceId, Session>>>,
    config: SessionConfig,
    on_initiate: Option<InitiateSyncHook>,
}

impl SessionManager {
    /// Create a manager with the given timing and optional initiate hook.
    pub fn new(config: SessionConfig, on_initiate: Option<InitiateSyncHook>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
            on_initiate,
        }
    }

    /// Open a session for a space, replacing any existing one. Returns the
    /// expiry to stamp into the `sync-request`.
    pub fn open(&self, space_id: &SpaceId) -> Timestamp {
        let expiry = now_millis() + self.config.request_expiry.as_millis() as Timestamp;
        {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.insert(
                space_id.clone(),
                Session {
                    expiry,
                    phase: Phase::Collecting,
                    candidates: Vec::new(),
                    in_progress: false,
                    sync_target: None,
                    timer: None,
                    timer_generation: 0,
                },
            );
        }
        self.schedule(space_id, self.config.request_expiry);
        expiry
    }

    /// Record a candidate reply. Returns false when the reply was discarded
    /// (no session, expired session, or selection already happened).
    pub fn add_candidate(&self, space_id: &SpaceId, candidate: SyncCandidate) -> bool {
        let first = {
            let mut sessions = self.sessions.lock().unwrap();
            if reap_if_expired(&mut sessions, space_id) {
                return false;
            }
            let Some(session) = sessions.get_mut(space_id) else {
                return false;
            };
            if session.phase != Phase::Collecting {
                return false;
            }
            session.candidates.push(candidate);
            session.candidates.len() == 1
        };

        // The first reply arms the aggressive timeout: no point waiting the
        // full window once somebody has answered.
        if first {
            self.schedule(space_id, self.config.aggressive_timeout);
        }
        true
    }

    /// Move a session into the syncing phase, picking the best candidate.
    ///
    /// With an empty candidate list the session is deleted and `None` is
    /// returned: there is nobody to sync with right now.
    pub fn begin_sync(&self, space_id: &SpaceId) -> Option<SyncCandidate> {
        let mut sessions = self.sessions.lock().unwrap();
        if reap_if_expired(&mut sessions, space_id) {
            return None;
        }
        let session = sessions.get_mut(space_id)?;

        let Some(best) = select_best_candidate(&session.candidates).cloned() else {
            sessions.remove(space_id);
            return None;
        };

        session.phase = Phase::Syncing;
        session.in_progress = true;
        session.sync_target = Some(best.inbox_address.clone());
        session.clear_timer();
        Some(best)
    }

    /// Terminal transition: the final delta was applied.
    pub fn complete(&self, space_id: &SpaceId) {
        self.sessions.lock().unwrap().remove(space_id);
    }

    /// Terminal transition: the host cancelled the sync.
    pub fn cancel(&self, space_id: &SpaceId) {
        self.sessions.lock().unwrap().remove(space_id);
    }

    /// Whether a live session exists. Reaps an expired one as a side effect.
    pub fn has_active_session(&self, space_id: &SpaceId) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        if reap_if_expired(&mut sessions, space_id) {
            return false;
        }
        sessions.contains_key(space_id)
    }

    /// Number of collected candidates, if a session exists.
    pub fn candidate_count(&self, space_id: &SpaceId) -> Option<usize> {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(space_id).map(|s| s.candidates.len())
    }

    /// The selected sync target, once syncing is in progress.
    pub fn sync_target(&self, space_id: &SpaceId) -> Option<InboxAddress> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(space_id)
            .filter(|s| s.in_progress)
            .and_then(|s| s.sync_target.clone())
    }

    /// Replace the session's timer with one firing after `delay`.
    fn schedule(&self, space_id: &SpaceId, delay: Duration) {
        let generation = {
            let mut sessions = self.sessions.lock().unwrap();
            let Some(session) = sessions.get_mut(space_id) else {
                return;
            };
            session.clear_timer();
            session.timer_generation += 1;
            session.timer_generation
        };

        let sessions = Arc::clone(&self.sessions);
        let on_initiate = self.on_initiate.clone();
        let space = space_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire_timer(&sessions, &space, generation, on_initiate);
        });

        let mut map = self.sessions.lock().unwrap();
        if let Some(session) = map.get_mut(space_id) {
            if session.timer_generation == generation {
                session.timer = Some(handle);
            } else {
                handle.abort();
            }
        } else {
            handle.abort();
        }
    }
}

/// Timer body: select the best candidate and notify the host.
fn fire_timer(
    sessions: &Mutex<HashMap<SpaceId, Session>>,
    space_id: &SpaceId,
    generation: u64,
    on_initiate: Option<InitiateSyncHook>,
) {
    let selected = {
        let mut map = sessions.lock().unwrap();
        let Some(session) = map.get_mut(space_id) else {
            return;
        };
        if session.timer_generation != generation || session.phase != Phase::Collecting {
            return;
        }
        session.timer = None;

        match select_best_candidate(&session.candidates).cloned() {
            Some(best) => {
                session.phase = Phase::Selected;
                best
            }
            None => {
                // Nobody answered: the request quietly dies.
                map.remove(space_id);
                return;
            }
        }
    };

    tracing::debug!(space = %space_id, target = %selected.inbox_address, "sync target selected");
    if let Some(hook) = on_initiate {
        if let Err(error) = hook(space_id, &selected) {
            tracing::warn!(space = %space_id, %error, "initiate-sync hook failed");
        }
    }
}

/// Stable best-candidate selection: message count desc, then member count
/// desc; the earliest arrival wins ties.
fn select_best_candidate(candidates: &[SyncCandidate]) -> Option<&SyncCandidate> {
    let mut best: Option<&SyncCandidate> = None;
    for candidate in candidates {
        let better = match best {
            None => true,
            Some(current) => {
                let lhs = (candidate.summary.message_count, candidate.summary.member_count);
                let rhs = (current.summary.message_count, current.summary.member_count);
                lhs > rhs
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

fn reap_if_expired(sessions: &mut HashMap<SpaceId, Session>, space_id: &SpaceId) -> bool {
    let expired = sessions
        .get(space_id)
        .is_some_and(|s| now_millis() > s.expiry);
    if expired {
        sessions.remove(space_id);
    }
    expired
}

/// Current time in milliseconds since the epoch.
pub(crate) fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as Timestamp
}
