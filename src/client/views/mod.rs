//! Page-level view state.
//!
//! A view holds the data one page shows plus the messages and navigation it
//! wants. Nothing is rendered here; a front end reads [`Screen`] snapshots.

pub mod account;
pub mod board;
pub mod comments;
pub mod groups;
pub mod settings;

pub use account::AccountView;
pub use board::TaskBoard;
pub use comments::CommentThread;
pub use groups::GroupsView;
pub use settings::GroupSettingsView;

use std::sync::{Arc, Mutex, MutexGuard};

use super::optimistic::Liveness;
use super::remote::ClientError;
use super::session::{Gate, SessionCache, Subscription};
use crate::auth::{Identity, LOGIN_PATH};

/// What a page currently shows
#[derive(Debug, Clone, PartialEq)]
pub struct Screen<S> {
    pub data: Option<S>,
    pub loading: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
    /// Navigation the page asks for, e.g. `/login` after sign-out
    pub redirect: Option<String>,
}

impl<S> Default for Screen<S> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            notice: None,
            redirect: None,
        }
    }
}

/// Session plumbing shared by every view: the subscription that clears the
/// page on sign-out, the liveness flag for in-flight calls, and the state.
pub(crate) struct ViewCore<S> {
    session: SessionCache,
    liveness: Liveness,
    screen: Arc<Mutex<Screen<S>>>,
    _subscription: Subscription,
}

fn lock<S>(screen: &Mutex<Screen<S>>) -> MutexGuard<'_, Screen<S>> {
    screen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<S: Send + 'static> ViewCore<S> {
    pub(crate) fn new(session: &SessionCache) -> Self {
        let screen = Arc::new(Mutex::new(Screen::default()));
        let target = screen.clone();
        let subscription = session.subscribe(move |identity| {
            if identity.is_none() {
                let mut screen = lock(&target);
                screen.data = None;
                screen.loading = false;
                screen.redirect = Some(LOGIN_PATH.to_string());
            }
        });
        Self {
            session: session.clone(),
            liveness: Liveness::new(),
            screen,
            _subscription: subscription,
        }
    }
}

impl<S> ViewCore<S> {
    pub(crate) fn session(&self) -> &SessionCache {
        &self.session
    }

    pub(crate) fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Screen<S>) -> R) -> R {
        f(&mut lock(&self.screen))
    }

    pub(crate) fn snapshot(&self) -> Screen<S>
    where
        S: Clone,
    {
        lock(&self.screen).clone()
    }

    /// The identity a protected read may run as. `None` means the page
    /// must not read: it is loading, or it has been sent to the login page.
    pub(crate) fn admit(&self) -> Option<Identity> {
        match self.session.gate() {
            Gate::Ready(identity) => Some(identity),
            Gate::Loading => {
                self.with(|screen| screen.loading = true);
                None
            }
            Gate::RedirectToLogin => {
                self.with(|screen| {
                    screen.data = None;
                    screen.loading = false;
                    screen.redirect = Some(LOGIN_PATH.to_string());
                });
                None
            }
        }
    }

    /// Session generation to compare against once a read completes
    pub(crate) fn ticket(&self) -> u64 {
        self.session.generation()
    }

    /// Whether a read started at `ticket` may still write into the page
    pub(crate) fn still_current(&self, ticket: u64) -> bool {
        self.liveness.is_alive() && self.session.generation() == ticket
    }

    /// Stores freshly loaded data unless the session moved on meanwhile
    pub(crate) fn store(&self, ticket: u64, data: S) -> bool {
        if !self.still_current(ticket) {
            return false;
        }
        self.with(|screen| {
            screen.data = Some(data);
            screen.loading = false;
            screen.error = None;
        });
        true
    }

    /// Records a failed call. A lost session signs the whole client out.
    pub(crate) fn fail(&self, err: &ClientError) {
        if !self.liveness.is_alive() {
            return;
        }
        if err.is_unauthenticated() {
            self.session.publish(None);
            return;
        }
        self.with(|screen| {
            screen.loading = false;
            screen.error = Some(err.to_string());
        });
    }

    pub(crate) fn reject(&self, message: &str) {
        self.with(|screen| screen.error = Some(message.to_string()));
    }
}

impl<S> Drop for ViewCore<S> {
    fn drop(&mut self) {
        self.liveness.teardown();
    }
}
