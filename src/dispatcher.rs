//! Dispatcher — routes inbound [`Packet`]s to durable subscribers and
//! one-shot waiters. The central concurrency primitive: everything else
//! (Session Manager, State Store, Request API) is built on top of
//! `subscribe` and `wait_for`.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::codec::Packet;
use crate::error::{ClientError, Result};

/// A durable handler invoked, in registration order, for every dispatched
/// packet matching its command. Must not block — it runs inline on the
/// reader task.
pub type Handler = Arc<dyn Fn(&Packet) + Send + Sync>;

/// A waiter predicate. Default (`None` passed to [`Dispatcher::wait_for`])
/// accepts any packet for the command.
pub type Predicate = Arc<dyn Fn(&Packet) -> bool + Send + Sync>;

struct SubEntry {
    id: u64,
    handler: Handler,
}

struct WaiterEntry {
    id: u64,
    predicate: Predicate,
    sender: Option<oneshot::Sender<Result<Packet>>>,
}

/// Opaque handle returned by [`Dispatcher::subscribe`]; pass to
/// [`Dispatcher::unsubscribe`] to remove the handler.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    command: String,
    id: u64,
}

#[derive(Default)]
pub struct Dispatcher {
    subscriptions: RwLock<HashMap<String, Vec<SubEntry>>>,
    all_subscriptions: RwLock<Vec<SubEntry>>,
    waiters: RwLock<HashMap<String, Vec<WaiterEntry>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a durable handler for `command`. Runs in registration
    /// order alongside any other subscribers on the same command, before
    /// any waiter on the same packet is resolved.
    pub fn subscribe(&self, command: impl Into<String>, handler: Handler) -> SubscriptionHandle {
        let command = command.into();
        let id = self.alloc_id();
        self.subscriptions
            .write()
            .entry(command.clone())
            .or_default()
            .push(SubEntry { id, handler });
        SubscriptionHandle { command, id }
    }

    /// Register a durable handler invoked for every dispatched packet,
    /// regardless of command — a raw tap useful for debugging or catching
    /// unhandled commands.
    pub fn subscribe_all(&self, handler: Handler) -> SubscriptionHandle {
        let id = self.alloc_id();
        self.all_subscriptions
            .write()
            .push(SubEntry { id, handler });
        SubscriptionHandle {
            command: String::new(),
            id,
        }
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if handle.command.is_empty() {
            self.all_subscriptions
                .write()
                .retain(|e| e.id != handle.id);
        } else if let Some(list) = self.subscriptions.write().get_mut(&handle.command) {
            list.retain(|e| e.id != handle.id);
        }
    }

    /// Register a one-shot waiter and return a future that resolves to the
    /// first matching packet, fails with [`ClientError::Timeout`] after
    /// `timeout`, or fails if the waiter is cancelled/disconnected.
    pub async fn wait_for(
        &self,
        command: impl Into<String>,
        predicate: Option<Predicate>,
        timeout: Duration,
    ) -> Result<Packet> {
        let command = command.into();
        let (tx, rx) = oneshot::channel();
        let id = self.alloc_id();
        let predicate = predicate.unwrap_or_else(|| Arc::new(|_: &Packet| true));

        self.waiters
            .write()
            .entry(command.clone())
            .or_default()
            .push(WaiterEntry {
                id,
                predicate,
                sender: Some(tx),
            });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::TransportError(
                "waiter cancelled before resolution".into(),
            )),
            Err(_) => {
                self.remove_waiter(&command, id);
                Err(ClientError::Timeout { command })
            }
        }
    }

    fn remove_waiter(&self, command: &str, id: u64) {
        if let Some(list) = self.waiters.write().get_mut(command) {
            list.retain(|e| e.id != id);
        }
    }

    /// Dispatch one inbound packet: run durable subscribers (command-keyed,
    /// then the raw-tap set) to completion, then resolve at most one
    /// matching waiter. Subscribers always run before the waiter is
    /// resolved so that State Store mutations performed by a subscriber
    /// are visible the instant a waiter's awaiter resumes.
    pub fn dispatch(&self, packet: &Packet) {
        self.run_subscribers(packet);
        self.resolve_waiter(packet);
    }

    fn run_subscribers(&self, packet: &Packet) {
        let handlers: Vec<Handler> = self
            .subscriptions
            .read()
            .get(&packet.command)
            .map(|list| list.iter().map(|e| e.handler.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(packet))) {
                log::error!(
                    "subscription handler for '{}' panicked: {:?}",
                    packet.command,
                    panic_message(&panic)
                );
            }
        }

        let tap_handlers: Vec<Handler> = self
            .all_subscriptions
            .read()
            .iter()
            .map(|e| e.handler.clone())
            .collect();
        for handler in tap_handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(packet))) {
                log::error!("raw-tap handler panicked: {:?}", panic_message(&panic));
            }
        }
    }

    fn resolve_waiter(&self, packet: &Packet) {
        let mut waiters = self.waiters.write();
        let Some(list) = waiters.get_mut(&packet.command) else {
            return;
        };

        // Lazily drop cancelled waiters (receiver dropped) before matching.
        list.retain(|e| e.sender.as_ref().map(|s| !s.is_closed()).unwrap_or(false));

        let mut matched_index = None;
        for (idx, entry) in list.iter().enumerate() {
            let matches = catch_unwind(AssertUnwindSafe(|| (entry.predicate)(packet)))
                .unwrap_or(false);
            if matches {
                matched_index = Some(idx);
                break;
            }
        }

        if let Some(idx) = matched_index {
            let mut entry = list.remove(idx);
            if let Some(sender) = entry.sender.take() {
                let _ = sender.send(Ok(packet.clone()));
            }
        }
    }

    /// Fail every outstanding waiter with a disconnected error and clear
    /// all buckets. Called by the Connection when it transitions to
    /// Closing.
    pub fn cancel_all_waiters(&self) {
        let mut waiters = self.waiters.write();
        for (_, list) in waiters.drain() {
            for mut entry in list {
                if let Some(sender) = entry.sender.take() {
                    let _ = sender.send(Err(ClientError::TransportError(
                        "connection closed".into(),
                    )));
                }
            }
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
