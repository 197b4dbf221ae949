// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Listener registry with per-listener failure isolation.
//!
//! Every broadcast item is delivered to every registered listener. A listener
//! that returns an error or panics is reported to the error hook (or logged)
//! and delivery continues with the next one. Nothing escapes `broadcast`.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tracing::{debug, trace};

use super::lock;

/// Result returned by listeners.
pub type ListenerResult = anyhow::Result<()>;

type Listener<T> = Arc<dyn Fn(&T) -> ListenerResult + Send + Sync>;
type ErrorHook = Arc<dyn Fn(ListenerId, &DeliveryError) + Send + Sync>;

/// Identifies one registration within a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// A failure raised by a single listener during delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The listener returned an error.
    #[error("listener failed: {0:#}")]
    Failed(anyhow::Error),
    /// The listener panicked.
    #[error("listener panicked: {0}")]
    Panicked(String),
}

struct Inner<T> {
    listeners: Vec<(ListenerId, Listener<T>)>,
    next_id: u64,
    error_hook: Option<ErrorHook>,
}

/// Cloneable registry of listeners for items of type `T`.
pub struct Hub<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Hub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Hub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Hub")
            .field("listeners", &inner.listeners.len())
            .field("error_hook", &inner.error_hook.is_some())
            .finish()
    }
}

impl<T> Hub<T> {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                listeners: Vec::new(),
                next_id: 1,
                error_hook: None,
            })),
        }
    }

    /// Registers a listener and returns its deregistration handle.
    ///
    /// Dropping the handle does not unsubscribe; call
    /// [`Subscription::unsubscribe`] or [`Hub::unsubscribe`].
    pub fn subscribe<F>(&self, listener: F) -> Subscription<T>
    where
        F: Fn(&T) -> ListenerResult + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        trace!("Registered {id} ({} total)", inner.listeners.len());

        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        remove(&self.inner, id)
    }

    /// Installs a hook observing delivery failures, replacing any previous one.
    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(ListenerId, &DeliveryError) + Send + Sync + 'static,
    {
        lock(&self.inner).error_hook = Some(Arc::new(hook));
    }

    /// Removes the error hook. Failures are then only logged.
    pub fn clear_error_hook(&self) {
        lock(&self.inner).error_hook = None;
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    /// Returns true if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every listener.
    pub fn clear(&self) {
        lock(&self.inner).listeners.clear();
    }

    /// Delivers `item` to every listener registered when the call starts.
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe from within their callback. Returns the number of
    /// listeners that accepted the item.
    pub fn broadcast(&self, item: &T) -> usize {
        let (listeners, hook) = {
            let inner = lock(&self.inner);
            (inner.listeners.clone(), inner.error_hook.clone())
        };

        let mut delivered = 0;
        for (id, listener) in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(item)));
            let error = match outcome {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => DeliveryError::Failed(e),
                Err(payload) => DeliveryError::Panicked(panic_message(payload.as_ref())),
            };

            match &hook {
                Some(hook) => {
                    // A failing hook must not abort delivery either.
                    if panic::catch_unwind(AssertUnwindSafe(|| hook(id, &error))).is_err() {
                        debug!("Error hook panicked while reporting {id}");
                    }
                }
                None => debug!("Dropped delivery failure from {id}: {error}"),
            }
        }
        delivered
    }
}

fn remove<T>(inner: &Mutex<Inner<T>>, id: ListenerId) -> bool {
    let mut inner = lock(inner);
    let before = inner.listeners.len();
    inner.listeners.retain(|(existing, _)| *existing != id);
    let removed = inner.listeners.len() != before;
    if removed {
        trace!("Removed {id} ({} left)", inner.listeners.len());
    }
    removed
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle returned by [`Hub::subscribe`].
///
/// Holds no strong reference to the hub, so outliving it is harmless.
pub struct Subscription<T> {
    id: ListenerId,
    hub: Weak<Mutex<Inner<T>>>,
}

impl<T> Subscription<T> {
    /// The registration's identifier.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the listener. Returns false if the hub is gone or the
    /// listener was already removed.
    pub fn unsubscribe(self) -> bool {
        self.hub
            .upgrade()
            .is_some_and(|inner| remove(&inner, self.id))
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
