//! Server-side sessions.
//!
//! The browser only holds a random session id (the `warbler_session`
//! cookie); the data lives in an in-process [`SessionStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};
use uuid::Uuid;

use warbler_types::models::{Flash, FlashLevel};

/// Session key holding the logged-in user's id.
pub const CURR_USER_KEY: &str = "curr_user";

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "warbler_session";

const FLASHES_KEY: &str = "_flashes";

/// Key/value data stored for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    data: HashMap<String, serde_json::Value>,
}

impl SessionData {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.data.insert(key.to_string(), v);
            }
            Err(e) => warn!("Dropping unserializable session value for '{}': {}", key, e),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.data.remove(key);
    }
}

/// How long an idle session survives.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Anonymous sessions (flashes only) kept before the oldest are dropped.
pub const DEFAULT_MAX_ANONYMOUS: usize = 10_000;

struct StoredSession {
    data: SessionData,
    last_seen: SystemTime,
}

impl StoredSession {
    fn is_expired(&self, now: SystemTime, ttl: Duration) -> bool {
        now.duration_since(self.last_seen)
            .map(|idle| idle >= ttl)
            .unwrap_or(false)
    }

    fn is_anonymous(&self) -> bool {
        !self.data.data.contains_key(CURR_USER_KEY)
    }
}

/// In-process session map with idle expiry.
///
/// Expired entries are swept lazily when the map grows past the anonymous
/// limit, and periodically by [`SessionStore::sweep`]. Anonymous sessions
/// beyond the limit are evicted oldest first; logged-in ones only expire.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, StoredSession>>>,
    idle_ttl: Duration,
    max_anonymous: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_IDLE_TTL, DEFAULT_MAX_ANONYMOUS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(idle_ttl: Duration, max_anonymous: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
            max_anonymous,
        }
    }

    /// Stores `data` under a fresh id and returns the id.
    pub fn create(&self, data: SessionData) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(
            id,
            StoredSession {
                data,
                last_seen: SystemTime::now(),
            },
        );
        self.evict(&mut sessions, id);
        id
    }

    /// Convenience for tests and tooling: a session already logged in as `user_id`.
    pub fn create_logged_in(&self, user_id: i64) -> Uuid {
        let mut data = SessionData::default();
        data.set(CURR_USER_KEY, user_id);
        self.create(data)
    }

    /// Whether `id` names a live (stored, unexpired) session.
    pub fn contains(&self, id: &Uuid) -> bool {
        let now = SystemTime::now();
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .is_some_and(|s| !s.is_expired(now, self.idle_ttl))
    }

    /// Marks a session as seen now. Returns false if it is gone or expired.
    pub fn touch(&self, id: &Uuid) -> bool {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.get(id).is_some_and(|s| s.is_expired(now, self.idle_ttl)) {
            sessions.remove(id);
            return false;
        }
        match sessions.get_mut(id) {
            Some(s) => {
                s.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Snapshot of a session; empty if the id is unknown or expired.
    pub fn load(&self, id: &Uuid) -> SessionData {
        let now = SystemTime::now();
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .filter(|s| !s.is_expired(now, self.idle_ttl))
            .map(|s| s.data.clone())
            .unwrap_or_default()
    }

    /// Mutates a session in place, creating it on first write.
    pub fn update<F, T>(&self, id: Uuid, f: F) -> T
    where
        F: FnOnce(&mut SessionData) -> T,
    {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if sessions.get(&id).is_some_and(|s| s.is_expired(now, self.idle_ttl)) {
            sessions.remove(&id);
        }
        let inserted = !sessions.contains_key(&id);
        let entry = sessions.entry(id).or_insert_with(|| StoredSession {
            data: SessionData::default(),
            last_seen: now,
        });
        entry.last_seen = now;
        let out = f(&mut entry.data);

        if inserted {
            self.evict(&mut sessions, id);
        }
        out
    }

    pub fn remove(&self, id: &Uuid) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Forgets a session that no longer holds anything.
    pub fn remove_if_empty(&self, id: &Uuid) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.get(id).is_some_and(|s| s.data.data.is_empty()) {
            sessions.remove(id);
        }
    }

    /// Drops every expired session, returning how many went.
    pub fn sweep(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, self.idle_ttl));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, sessions: &mut HashMap<Uuid, StoredSession>, keep: Uuid) {
        if sessions.len() <= self.max_anonymous {
            return;
        }

        let now = SystemTime::now();
        sessions.retain(|_, s| !s.is_expired(now, self.idle_ttl));

        let mut anonymous: Vec<(SystemTime, Uuid)> = sessions
            .iter()
            .filter(|(id, s)| **id != keep && s.is_anonymous())
            .map(|(id, s)| (s.last_seen, *id))
            .collect();
        let limit = match sessions.get(&keep) {
            Some(s) if s.is_anonymous() => self.max_anonymous.saturating_sub(1),
            _ => self.max_anonymous,
        };
        if anonymous.len() <= limit {
            return;
        }

        anonymous.sort_unstable();
        let excess = anonymous.len() - limit;
        for (_, id) in anonymous.into_iter().take(excess) {
            sessions.remove(&id);
        }
        debug!("Evicted {} anonymous sessions", excess);
    }
}

/// Background task that drops idle sessions every `interval_secs`.
pub async fn run_sweep_loop(store: SessionStore, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let swept = store.sweep();
        if swept > 0 {
            info!("Session sweep: dropped {} idle sessions", swept);
        }
    }
}

/// Handle to the current request's session.
///
/// Logging out discards the stored session and switches the handle to a new
/// id, so clones taken before the handler ran see the rotation.
#[derive(Clone)]
pub struct Session {
    id: Arc<Mutex<Uuid>>,
    store: SessionStore,
}

impl Session {
    pub fn new(id: Uuid, store: SessionStore) -> Self {
        Self {
            id: Arc::new(Mutex::new(id)),
            store,
        }
    }

    pub fn id(&self) -> Uuid {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.store.load(&self.id()).get(CURR_USER_KEY)
    }

    pub fn login(&self, user_id: i64) {
        self.store.update(self.id(), |data| data.set(CURR_USER_KEY, user_id));
    }

    pub fn logout(&self) {
        let mut id = self.id.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.remove(&id);
        *id = Uuid::new_v4();
    }

    pub fn flash(&self, level: FlashLevel, text: impl Into<String>) {
        let flash = Flash {
            level,
            text: text.into(),
        };
        self.store.update(self.id(), |data| {
            let mut flashes: Vec<Flash> = data.get(FLASHES_KEY).unwrap_or_default();
            flashes.push(flash);
            data.set(FLASHES_KEY, flashes);
        });
    }

    /// Returns and clears the pending flashes.
    pub fn take_flashes(&self) -> Vec<Flash> {
        let id = self.id();
        if !self.store.contains(&id) {
            return Vec::new();
        }
        let flashes = self.store.update(id, |data| {
            let flashes = data.get(FLASHES_KEY).unwrap_or_default();
            data.remove(FLASHES_KEY);
            flashes
        });
        self.store.remove_if_empty(&id);
        flashes
    }
}
