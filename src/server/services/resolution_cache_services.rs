use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// episode + media pair. kept as a struct instead of a joined string so no separator can ever
/// collide with an id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub episode_id: String,
    pub media_id: String,
}

impl ResolutionKey {
    pub fn new(episode_id: impl Into<String>, media_id: impl Into<String>) -> Self {
        Self {
            episode_id: episode_id.into(),
            media_id: media_id.into(),
        }
    }
}

impl fmt::Display for ResolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.episode_id, self.media_id)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// clock that only moves when told to, for ttl tests
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone)]
struct ResolutionCacheEntry {
    source_url: String,
    expires_at: Instant,
    // bumped on every hit, lowest goes first when we're full
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ResolutionKey, ResolutionCacheEntry>,
    inflight: HashMap<ResolutionKey, Arc<Notify>>,
    tick: u64,
}

pub type DynResolutionCache = Arc<ResolutionCache>;

/// in memory map of resolved source urls with a ttl.
///
/// expiry is lazy, an expired entry is just treated as missing until something overwrites it or
/// it gets pushed out by the capacity bound. population is single flight per key: while one task
/// is resolving a key every other task asking for it waits instead of hitting the resolver too.
pub struct ResolutionCache {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    capacity: usize,
    // how long a waiter sits on someone else's resolve before doing it itself
    inflight_wait: Duration,
}

impl ResolutionCache {
    pub fn new(ttl: Duration, capacity: usize, inflight_wait: Duration) -> Self {
        Self::with_clock(ttl, capacity, inflight_wait, Arc::new(SystemClock))
    }

    pub fn with_clock(
        ttl: Duration,
        capacity: usize,
        inflight_wait: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "resolution cache ready (ttl {}s, capacity {})",
            ttl.as_secs(),
            capacity
        );

        Self {
            state: Mutex::new(CacheState::default()),
            clock,
            ttl,
            // zero would mean every put evicts itself
            capacity: capacity.max(1),
            inflight_wait,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // nothing in here panics while holding the lock, but a poisoned map is still a usable map
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// cached source url if it hasn't expired yet
    pub fn get(&self, key: &ResolutionKey) -> Option<String> {
        let now = self.clock.now();
        let mut state = self.lock();
        Self::get_live(&mut state, key, now)
    }

    /// unconditionally replaces whatever is stored for `key`, expiring `ttl` from now
    pub fn put(&self, key: ResolutionKey, source_url: String, ttl: Duration) {
        let now = self.clock.now();
        let mut state = self.lock();
        self.insert(&mut state, key, source_url, now + ttl);
    }

    /// live entry count, expired ones don't count
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .entries
            .values()
            .filter(|entry| now < entry.expires_at)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// read through the cache, running `resolve` on a miss and storing what it returns with the
    /// cache ttl. concurrent misses on the same key share one `resolve`. if that one fails (or
    /// takes longer than the inflight wait) the waiters resolve themselves, so duplicate upstream
    /// calls only happen after a failure.
    pub async fn get_or_resolve<F, Fut, E>(&self, key: &ResolutionKey, resolve: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let mut waited = false;

        let registered = loop {
            let notify = {
                let now = self.clock.now();
                let mut state = self.lock();

                if let Some(source_url) = Self::get_live(&mut state, key, now) {
                    debug!("resolution cache HIT for {}", key);
                    return Ok(source_url);
                }

                match state.inflight.get(key) {
                    Some(existing) if !waited => existing.clone(),
                    // already waited on someone once, resolve alongside them
                    Some(_) => break None,
                    None => {
                        let own = Arc::new(Notify::new());
                        state.inflight.insert(key.clone(), own.clone());
                        break Some(own);
                    }
                }
            };

            // notify_waiters only reaches futures that exist already, so build it before the
            // second look at the inflight map instead of after
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let still_inflight = self
                .lock()
                .inflight
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, &notify));

            if still_inflight {
                debug!("resolution of {} already in flight, waiting", key);
                if tokio::time::timeout(self.inflight_wait, notified).await.is_err() {
                    warn!("timed out waiting on inflight resolution of {}", key);
                }
            }
            waited = true;
        };

        // the guard clears the inflight marker even if this future is dropped mid resolve
        let _guard = registered.map(|notify| InflightGuard {
            cache: self,
            key,
            notify,
        });

        debug!("resolution cache MISS for {}, resolving", key);
        let result = resolve().await;

        if let Ok(source_url) = &result {
            let now = self.clock.now();
            let mut state = self.lock();
            self.insert(&mut state, key.clone(), source_url.clone(), now + self.ttl);
        }

        result
    }

    fn get_live(state: &mut CacheState, key: &ResolutionKey, now: Instant) -> Option<String> {
        state.tick += 1;
        let tick = state.tick;

        let entry = state.entries.get_mut(key)?;
        if now >= entry.expires_at {
            return None;
        }

        entry.last_used = tick;
        Some(entry.source_url.clone())
    }

    fn insert(
        &self,
        state: &mut CacheState,
        key: ResolutionKey,
        source_url: String,
        expires_at: Instant,
    ) {
        let now = self.clock.now();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            // expired entries go first, they're already logically gone
            state.entries.retain(|_, entry| now < entry.expires_at);

            if state.entries.len() >= self.capacity {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(key, _)| key.clone());

                if let Some(oldest) = oldest {
                    debug!("resolution cache full, evicting {}", oldest);
                    state.entries.remove(&oldest);
                }
            }
        }

        state.tick += 1;
        let entry = ResolutionCacheEntry {
            source_url,
            expires_at,
            last_used: state.tick,
        };
        state.entries.insert(key, entry);
    }
}

struct InflightGuard<'a> {
    cache: &'a ResolutionCache,
    key: &'a ResolutionKey,
    notify: Arc<Notify>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.cache.lock();
            let ours = state
                .inflight
                .get(self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.notify));
            if ours {
                state.inflight.remove(self.key);
            }
        }
        self.notify.notify_waiters();
    }
}
