//! The synchronous, depth-first publish/subscribe bus.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use swp_diag::SimError;

use crate::message::{Message, Topic};

/// An opaque handle returned by [`MessageBus::subscribe`], usable with
/// [`MessageBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// A handler registered against a topic.
///
/// Handlers return `Err` to signal a fault; the bus converts that into a
/// [`SimError::HandlerFault`], logs it, and continues delivering the message
/// to the remaining subscribers.
type Handler = Box<dyn FnMut(&Message) -> Result<(), String>>;

#[derive(Clone)]
struct Subscription {
    handle: SubscriptionHandle,
    handler: Rc<RefCell<Handler>>,
}

/// The synchronous, same-thread, depth-first message bus.
///
/// `subscribe` and `publish` both take `&self` (not `&mut self`): delivery
/// is depth-first and a handler may itself publish to another topic or
/// subscribe to a new one, so the bus needs interior mutability to remain
/// reentrant. New subscribers registered mid-delivery take effect starting
/// with the *next* `publish` call, never retroactively for the delivery
/// already in flight, per the synchronous-cascade contract.
pub struct MessageBus {
    subscriptions: RefCell<HashMap<Topic, Vec<Subscription>>>,
    next_handle: Cell<u64>,
    depth: Cell<usize>,
    max_cascade_depth: usize,
}

impl MessageBus {
    /// The default cascade-depth limit before `publish` raises
    /// [`SimError::CascadeDepthExceeded`].
    pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 64;

    /// Creates a bus with the default cascade-depth limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_cascade_depth(Self::DEFAULT_MAX_CASCADE_DEPTH)
    }

    /// Creates a bus with a custom cascade-depth limit.
    #[must_use]
    pub fn with_max_cascade_depth(max_cascade_depth: usize) -> Self {
        Self {
            subscriptions: RefCell::new(HashMap::new()),
            next_handle: Cell::new(1),
            depth: Cell::new(0),
            max_cascade_depth,
        }
    }

    /// Registers `handler` to receive all future messages on `topic`.
    ///
    /// Returns a handle usable with [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(
        &self,
        topic: impl Into<Topic>,
        handler: impl FnMut(&Message) -> Result<(), String> + 'static,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);

        self.subscriptions
            .borrow_mut()
            .entry(topic.into())
            .or_default()
            .push(Subscription {
                handle,
                handler: Rc::new(RefCell::new(Box::new(handler))),
            });

        handle
    }

    /// Removes a previously registered subscription. A no-op if the handle
    /// is unknown (already removed, or never valid).
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut subs = self.subscriptions.borrow_mut();
        for list in subs.values_mut() {
            list.retain(|s| s.handle != handle);
        }
    }

    /// Delivers `message` synchronously to every currently-registered
    /// subscriber of `topic`, in subscription order, then returns.
    ///
    /// A handler that publishes to another topic during delivery causes
    /// that nested publish to run to completion (depth-first) before the
    /// next subscriber of `topic` runs. `publish` to a topic with no
    /// subscribers succeeds silently.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::CascadeDepthExceeded`] if this publish would
    /// exceed the configured cascade depth. Individual handler failures do
    /// not propagate as an `Err` from this function — they are logged and
    /// delivery continues.
    pub fn publish(&self, topic: impl Into<Topic>, message: Message) -> Result<(), SimError> {
        let topic = topic.into();

        if self.depth.get() >= self.max_cascade_depth {
            return Err(SimError::CascadeDepthExceeded {
                topic: topic.0,
                limit: self.max_cascade_depth,
            });
        }

        self.depth.set(self.depth.get() + 1);
        let result = self.deliver(&topic, &message);
        self.depth.set(self.depth.get() - 1);
        result
    }

    fn deliver(&self, topic: &Topic, message: &Message) -> Result<(), SimError> {
        // Snapshot the subscriber list (cloning the `Rc` handles, not the
        // closures themselves) so handlers that subscribe/unsubscribe
        // during this delivery don't affect the in-flight iteration, and so
        // no `RefCell` borrow on `self.subscriptions` is held while a
        // handler runs (a handler may reentrantly call `subscribe`).
        let snapshot: Vec<Subscription> = {
            let subs = self.subscriptions.borrow();
            match subs.get(topic) {
                Some(list) => list.clone(),
                None => return Ok(()),
            }
        };

        for sub in snapshot {
            // The handler may have been unsubscribed by a prior handler in
            // this same delivery; `unsubscribe` only drops it from the
            // registry's `Vec`, so our cloned `Rc` still runs it to
            // completion here. That is consistent with "currently
            // registered at delivery start" semantics.
            let outcome = (sub.handler.borrow_mut())(message);
            if let Err(reason) = outcome {
                let fault = SimError::HandlerFault {
                    topic: topic.0.clone(),
                    subscriber_id: sub.handle.0,
                    reason,
                };
                tracing::warn!(%fault, "handler fault, publication continues");
            }
        }

        Ok(())
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
