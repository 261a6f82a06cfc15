//! Client-side session cache.
//!
//! One `SessionCache` is created per client and handed to every view that
//! needs to know who is signed in. Views subscribe for changes and keep the
//! returned [`Subscription`] for as long as they live; dropping it (or calling
//! [`Subscription::cancel`]) guarantees the view's callback is never invoked
//! again.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::remote::{ClientError, Remote};
use crate::auth::Identity;

/// Lifecycle of the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Resolved(Option<Identity>),
    Disposed,
}

/// What a view should do right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// First resolution has not finished: render a loading state
    Loading,
    RedirectToLogin,
    Ready(Identity),
}

type Callback = Box<dyn FnMut(Option<&Identity>) + Send>;

struct Subscriber {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

struct Inner {
    state: SessionState,
    generation: u64,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    delivering: bool,
}

/// Subscribers taken out of the cache for one delivery round. Dropping it
/// puts them back, also when a callback panics.
struct Delivery<'a> {
    inner: &'a Mutex<Inner>,
    subscribers: Vec<Subscriber>,
}

impl<'a> Delivery<'a> {
    fn start(inner: &'a Mutex<Inner>) -> Self {
        let subscribers = mem::take(&mut lock(inner).subscribers);
        Self { inner, subscribers }
    }
}

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        let mut subscribers = mem::take(&mut self.subscribers);
        // Subscribers added during delivery go after the existing ones
        subscribers.append(&mut inner.subscribers);
        subscribers.retain(|sub| sub.active.load(Ordering::SeqCst));
        if inner.state == SessionState::Disposed {
            for subscriber in subscribers.drain(..) {
                subscriber.active.store(false, Ordering::SeqCst);
            }
        }
        inner.subscribers = subscribers;
        if std::thread::panicking() {
            inner.delivering = false;
        }
    }
}

#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<Mutex<Inner>>,
    watch: Arc<watch::Sender<SessionState>>,
}

/// Handle to one subscriber; cancels on drop
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// Stops deliveries to this subscriber. Safe to call any number of times,
    /// including from inside the subscriber's own callback.
    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner).subscribers.retain(|sub| sub.id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // A panicking subscriber must not take the session down with it
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn same_user(a: Option<&Identity>, b: Option<&Identity>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.id == b.id && a.email == b.email,
        _ => false,
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCache {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SessionState::Uninitialized);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Uninitialized,
                generation: 0,
                subscribers: Vec::new(),
                next_id: 0,
                delivering: false,
            })),
            watch: Arc::new(sender),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner).state.clone()
    }

    /// Number of logical session changes delivered so far
    pub fn generation(&self) -> u64 {
        lock(&self.inner).generation
    }

    /// The signed-in identity, only once the session has been resolved
    pub fn current(&self) -> Option<Identity> {
        match &lock(&self.inner).state {
            SessionState::Resolved(identity) => identity.clone(),
            _ => None,
        }
    }

    pub fn gate(&self) -> Gate {
        match &lock(&self.inner).state {
            SessionState::Resolved(Some(identity)) => Gate::Ready(identity.clone()),
            SessionState::Resolved(None) | SessionState::Disposed => Gate::RedirectToLogin,
            SessionState::Uninitialized | SessionState::Loading => Gate::Loading,
        }
    }

    /// State changes for async consumers, e.g. to await the first resolution
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.watch.subscribe()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Option<&Identity>) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            active: active.clone(),
            callback: Box::new(callback),
        });
        Subscription {
            id,
            active,
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn set_state(&self, state: SessionState) {
        lock(&self.inner).state = state.clone();
        self.watch.send_replace(state);
    }

    /// Records `identity` as the session and notifies subscribers on the
    /// caller's task. Delivers nothing when the signed-in user did not change.
    ///
    /// A publish from inside a callback only records the new state; the
    /// delivery already running sends it to every subscriber once the
    /// current round is over.
    pub fn publish(&self, identity: Option<Identity>) {
        {
            let mut inner = lock(&self.inner);
            if inner.state == SessionState::Disposed {
                return;
            }
            let changed = match &inner.state {
                SessionState::Resolved(previous) => !same_user(previous.as_ref(), identity.as_ref()),
                _ => true,
            };
            inner.state = SessionState::Resolved(identity.clone());
            self.watch.send_replace(SessionState::Resolved(identity.clone()));
            if !changed {
                return;
            }
            inner.generation += 1;
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }

        let mut current = identity;
        loop {
            let mut round = Delivery::start(&self.inner);
            tracing::debug!(
                signed_in = current.is_some(),
                subscribers = round.subscribers.len(),
                "Delivering session change"
            );
            for subscriber in round.subscribers.iter_mut() {
                if subscriber.active.load(Ordering::SeqCst) {
                    (subscriber.callback)(current.as_ref());
                }
            }
            drop(round);

            let mut inner = lock(&self.inner);
            let latest = match &inner.state {
                SessionState::Resolved(latest) => Some(latest.clone()),
                _ => None,
            };
            match latest {
                Some(latest) if !same_user(latest.as_ref(), current.as_ref()) => current = latest,
                _ => {
                    inner.delivering = false;
                    return;
                }
            }
        }
    }

    /// First resolution. A failure to reach the service resolves to signed
    /// out, so no view ever renders protected content on a guess.
    pub async fn initialize(&self, remote: &dyn Remote) -> Result<Option<Identity>, ClientError> {
        if self.state() != SessionState::Uninitialized {
            return Ok(self.current());
        }
        self.set_state(SessionState::Loading);
        match remote.session().await {
            Ok(identity) => {
                self.publish(identity.clone());
                Ok(identity)
            }
            Err(ClientError::Unauthenticated) => {
                self.publish(None);
                Ok(None)
            }
            Err(err) => {
                tracing::warn!("Session initialization failed, treating as signed out: {}", err);
                self.publish(None);
                Err(err)
            }
        }
    }

    pub async fn sign_in(&self, remote: &dyn Remote, email: &str, password: &str) -> Result<Identity, ClientError> {
        let identity = remote.sign_in(email, password).await?;
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    /// Signs out remotely; the local session ends even when the remote call fails
    pub async fn sign_out(&self, remote: &dyn Remote) -> Result<(), ClientError> {
        let result = remote.sign_out().await;
        self.publish(None);
        result
    }

    /// Re-reads the session from the service. Transport failures keep the
    /// current state; only an answer from the service changes it.
    pub async fn refresh(&self, remote: &dyn Remote) -> Result<Option<Identity>, ClientError> {
        match remote.session().await {
            Ok(identity) => {
                self.publish(identity.clone());
                Ok(identity)
            }
            Err(ClientError::Unauthenticated) => {
                self.publish(None);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Refreshes every `every` until the cache is disposed
    pub fn spawn_refresh(&self, remote: Arc<dyn Remote>, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if cache.state() == SessionState::Disposed {
                    break;
                }
                if let Err(err) = cache.refresh(remote.as_ref()).await {
                    tracing::warn!("Session refresh failed: {}", err);
                }
            }
        })
    }

    /// Ends the cache: every subscription is released and later
    /// publishes are ignored.
    pub fn dispose(&self) {
        let subscribers = {
            let mut inner = lock(&self.inner);
            inner.state = SessionState::Disposed;
            mem::take(&mut inner.subscribers)
        };
        for subscriber in &subscribers {
            subscriber.active.store(false, Ordering::SeqCst);
        }
        self.watch.send_replace(SessionState::Disposed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    fn identity(email: &str) -> Identity {
        let now = Utc::now();
        Identity {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            issued_at: now,
            expires_at: now + chrono::Duration::hours(1),
        }
    }

    fn counter(cache: &SessionCache) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let sub = cache.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn gate_is_loading_until_first_resolution() {
        let cache = SessionCache::new();
        assert_eq!(cache.gate(), Gate::Loading);
        assert_eq!(cache.current(), None);

        cache.publish(None);
        assert_eq!(cache.gate(), Gate::RedirectToLogin);

        let ada = identity("ada@example.com");
        cache.publish(Some(ada.clone()));
        assert_eq!(cache.gate(), Gate::Ready(ada.clone()));
        assert_eq!(cache.current(), Some(ada));
    }

    #[test]
    fn unchanged_identity_is_not_redelivered() {
        let cache = SessionCache::new();
        let (count, _sub) = counter(&cache);
        let ada = identity("ada@example.com");

        cache.publish(Some(ada.clone()));
        let mut refreshed = ada.clone();
        refreshed.expires_at = ada.expires_at + chrono::Duration::hours(1);
        cache.publish(Some(refreshed.clone()));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(cache.generation(), 1);
        // The stored identity still carries the newer expiry
        assert_eq!(cache.current(), Some(refreshed));

        cache.publish(None);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_is_idempotent_and_stops_delivery() {
        let cache = SessionCache::new();
        let (count, sub) = counter(&cache);

        cache.publish(None);
        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        cache.publish(Some(identity("ada@example.com")));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_subscription_cancels() {
        let cache = SessionCache::new();
        let (count, sub) = counter(&cache);
        drop(sub);
        cache.publish(None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscriber_cancelled_by_another_callback_stops_receiving() {
        let cache = SessionCache::new();
        let (count, second) = counter(&cache);
        let second = Arc::new(Mutex::new(Some(second)));

        // Registered after `counter`, but cancels it before the next round
        let slot = second.clone();
        let _first = cache.subscribe(move |identity| {
            if identity.is_none() {
                if let Some(sub) = slot.lock().unwrap().take() {
                    sub.cancel();
                }
            }
        });

        cache.publish(Some(identity("ada@example.com")));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        cache.publish(None);
        // Delivered to `counter` before the cancelling callback ran
        assert_eq!(count.load(Ordering::SeqCst), 2);
        cache.publish(Some(identity("bob@example.com")));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn publish_from_a_callback_reaches_every_subscriber() {
        let cache = SessionCache::new();
        let signing_out = cache.clone();
        let _signs_out = cache.subscribe(move |identity| {
            if identity.is_some() {
                signing_out.publish(None);
            }
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let _observer = cache.subscribe(move |identity| {
            log.lock().unwrap().push(identity.is_some());
        });

        cache.publish(Some(identity("ada@example.com")));

        assert_eq!(cache.state(), SessionState::Resolved(None));
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn panicking_subscriber_does_not_lose_the_others() {
        let cache = SessionCache::new();
        let (count, sub) = counter(&cache);
        let armed = Arc::new(AtomicBool::new(true));
        let trigger = armed.clone();
        let _faulty = cache.subscribe(move |_| {
            if trigger.swap(false, Ordering::SeqCst) {
                panic!("subscriber failed");
            }
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cache.publish(None)));
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        cache.publish(Some(identity("ada@example.com")));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(sub.is_active());
    }

    #[test]
    fn dispose_silences_everything() {
        let cache = SessionCache::new();
        let (count, sub) = counter(&cache);
        cache.dispose();

        cache.publish(Some(identity("ada@example.com")));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!sub.is_active());
        assert_eq!(cache.state(), SessionState::Disposed);
        assert_eq!(cache.gate(), Gate::RedirectToLogin);
    }

    #[tokio::test]
    async fn watch_sees_resolution() {
        let cache = SessionCache::new();
        let mut rx = cache.watch();
        let ada = identity("ada@example.com");

        cache.publish(Some(ada.clone()));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SessionState::Resolved(Some(ada)));
    }
}
