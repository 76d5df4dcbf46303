//! Live query simulation.

use crate::functions::FunctionPath;
use crate::identity::UserIdentity;
use docsim_values::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Called with each new query result.
pub type UpdateCallback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Subscription {
    component: String,
    path: FunctionPath,
    args: Value,
    identity: Option<UserIdentity>,
    callback: UpdateCallback,
    last: Option<Value>,
}

/// What a refresh needs to re-run one subscription.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionSnapshot {
    pub id: u64,
    pub component: String,
    pub path: FunctionPath,
    pub args: Value,
    pub identity: Option<UserIdentity>,
}

/// Live subscriptions, re-run after every committed top-level write.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<BTreeMap<u64, Subscription>>,
    next_id: AtomicU64,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub(crate) fn add(
        &self,
        component: String,
        path: FunctionPath,
        args: Value,
        identity: Option<UserIdentity>,
        callback: UpdateCallback,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().insert(
            id,
            Subscription {
                component,
                path,
                args,
                identity,
                callback,
                last: None,
            },
        );
        id
    }

    fn remove(&self, id: u64) {
        self.subscriptions.lock().remove(&id);
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Returns true when nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn snapshot(&self) -> Vec<SubscriptionSnapshot> {
        self.subscriptions
            .lock()
            .iter()
            .map(|(id, s)| SubscriptionSnapshot {
                id: *id,
                component: s.component.clone(),
                path: s.path.clone(),
                args: s.args.clone(),
                identity: s.identity.clone(),
            })
            .collect()
    }

    /// Records a result and calls back if it differs from the previous one.
    pub(crate) fn deliver(&self, id: u64, value: Value) {
        let callback = {
            let mut subscriptions = self.subscriptions.lock();
            let Some(subscription) = subscriptions.get_mut(&id) else {
                return;
            };
            if subscription.last.as_ref() == Some(&value) {
                return;
            }
            subscription.last = Some(value.clone());
            Arc::clone(&subscription.callback)
        };
        // callbacks may subscribe or unsubscribe
        callback(&value);
    }
}

/// Keeps a subscription alive; dropping it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: u64,
    registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, registry: &Arc<SubscriptionRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Unsubscribes now.
    pub fn unsubscribe(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
