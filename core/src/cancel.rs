//! Cooperative cancellation.
//!
//! # Design
//! A `CancelToken` is either pending or settled with a `Cancel` reason.
//! Settling happens at most once; the first reason sticks. Interested
//! parties register one-shot observers that fire exactly once on the
//! transition, outside the token's lock, so an observer may itself touch
//! the token. Registration hands back a `Subscription` guard: dropping it
//! removes the observer, which is how a dispatch stops holding the token
//! once it has settled.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Why a token was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cancel {
    pub message: Option<String>,
}

impl Cancel {
    pub fn new(message: impl Into<String>) -> Self {
        Cancel {
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for Cancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("Request cancelled"))
    }
}

impl std::error::Error for Cancel {}

type Observer = Box<dyn FnOnce(&Cancel) + Send>;

#[derive(Default)]
struct State {
    reason: Option<Cancel>,
    observers: Vec<(u64, Observer)>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CancelToken")
            .field("reason", &state.reason)
            .field("observers", &state.observers.len())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh token paired with the handle that cancels it.
    pub fn source() -> CancelSource {
        CancelSource {
            token: CancelToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().reason.is_some()
    }

    pub fn reason(&self) -> Option<Cancel> {
        self.state.lock().reason.clone()
    }

    /// `Err` with the reason once the token has settled.
    pub fn throw_if_requested(&self) -> Result<(), Cancel> {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Settle the token. Returns `false` if it had already settled.
    pub fn cancel(&self, reason: Cancel) -> bool {
        let observers = {
            let mut state = self.state.lock();
            if state.reason.is_some() {
                return false;
            }
            state.reason = Some(reason.clone());
            std::mem::take(&mut state.observers)
        };
        log::debug!("cancel token settled: {reason}");
        for (_, observer) in observers {
            observer(&reason);
        }
        true
    }

    /// Register a one-shot observer. If the token has already settled the
    /// observer runs immediately.
    pub fn subscribe(&self, observer: impl FnOnce(&Cancel) + Send + 'static) -> Subscription {
        let mut state = self.state.lock();
        if let Some(reason) = state.reason.clone() {
            drop(state);
            observer(&reason);
            return Subscription {
                state: Weak::new(),
                id: 0,
            };
        }
        let id = state.next_id;
        state.next_id += 1;
        state.observers.push((id, Box::new(observer)));
        Subscription {
            state: Arc::downgrade(&self.state),
            id,
        }
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }
}

/// Owner side of a token.
#[derive(Debug, Clone)]
pub struct CancelSource {
    pub token: CancelToken,
}

impl CancelSource {
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self, message: impl Into<String>) -> bool {
        self.token.cancel(Cancel::new(message))
    }
}

/// Keeps an observer registered; dropping it unregisters.
#[must_use = "dropping a Subscription unregisters its observer"]
pub struct Subscription {
    state: Weak<Mutex<State>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().observers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn starts_pending() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
        assert!(token.throw_if_requested().is_ok());
    }

    #[test]
    fn first_reason_sticks() {
        let source = CancelToken::source();
        assert!(source.cancel("first"));
        assert!(!source.cancel("second"));
        assert_eq!(source.token().reason(), Some(Cancel::new("first")));
        assert_eq!(source.token.throw_if_requested(), Err(Cancel::new("first")));
    }

    #[test]
    fn observers_fire_exactly_once() {
        let source = CancelToken::source();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = source.token().subscribe(move |reason| {
            assert_eq!(reason.message.as_deref(), Some("stop"));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        source.cancel("stop");
        source.cancel("again");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_subscriber_runs_immediately() {
        let token = CancelToken::new();
        token.cancel(Cancel::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = token.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let source = CancelToken::source();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = source.token().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(source.token.observer_count(), 1);
        drop(sub);
        assert_eq!(source.token.observer_count(), 0);
        source.cancel("nobody listens");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn observer_may_query_the_token() {
        let token = CancelToken::new();
        let inner = token.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let flag = seen.clone();
        let _sub = token.subscribe(move |_| {
            if inner.is_cancelled() {
                flag.store(1, Ordering::SeqCst);
            }
        });
        token.cancel(Cancel::new("x"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_message() {
        assert_eq!(Cancel::default().to_string(), "Request cancelled");
        assert_eq!(Cancel::new("user left").to_string(), "user left");
    }
}
