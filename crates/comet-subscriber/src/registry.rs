//! Per-path subscriber registry.
//!
//! Each attached path owns a doubly linked list of subscriber handles stored in
//! a slot vector, plus an index from [`SubscriberId`] to slot. New subscribers
//! go to the head; dispatch walks head to tail. Insert and remove are O(1).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::types::BoxError;

/// Something that can receive updates by method name.
///
/// Names are resolved on every call, so an implementation that keeps its
/// handlers in interior-mutable storage can swap a method between updates.
pub trait Target: Send + Sync {
    fn call_method(
        &self,
        method: &str,
        _path: &str,
        _message: &serde_json::Value,
    ) -> Result<(), BoxError> {
        Err(format!("no method named `{method}`").into())
    }
}

/// A callback invoked with its subscription's target.
pub type Callback =
    Arc<dyn Fn(&dyn Target, &str, &serde_json::Value) -> Result<(), BoxError> + Send + Sync>;

/// What to run on a target when an update arrives.
///
/// Clone an `Action` to disconnect it later: callback identity is the
/// allocation behind the `Arc`, not the closure's code.
#[derive(Clone)]
pub enum Action {
    /// Resolved on the target through [`Target::call_method`] at dispatch time.
    Method(String),
    Callback(Callback),
}

impl Action {
    pub fn method(name: impl Into<String>) -> Self {
        Action::Method(name.into())
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&dyn Target, &str, &serde_json::Value) -> Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        Action::Callback(Arc::new(f))
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Action::Callback(cb) => f
                .debug_tuple("Callback")
                .field(&arc_addr(cb))
                .finish(),
        }
    }
}

fn arc_addr<T: ?Sized>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc).cast::<()>() as usize
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ActionKey {
    Method(String),
    Callback(usize),
}

/// Dedup key for a `(target, action)` pair.
///
/// Addresses stay unique while the subscription exists because the handle
/// holds both `Arc`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId {
    target: usize,
    action: ActionKey,
}

impl SubscriberId {
    pub fn new(target: &Arc<dyn Target>, action: &Action) -> Self {
        let action = match action {
            Action::Method(name) => ActionKey::Method(name.clone()),
            Action::Callback(cb) => ActionKey::Callback(arc_addr(cb)),
        };
        Self {
            target: arc_addr(target),
            action,
        }
    }
}

/// A registered subscriber.
#[derive(Clone)]
pub struct SubscriberHandle {
    pub target: Arc<dyn Target>,
    pub action: Action,
}

impl SubscriberHandle {
    /// Run the action against the target.
    pub fn invoke(&self, path: &str, message: &serde_json::Value) -> Result<(), BoxError> {
        match &self.action {
            Action::Method(name) => self.target.call_method(name, path, message),
            Action::Callback(cb) => cb(self.target.as_ref(), path, message),
        }
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("target", &arc_addr(&self.target))
            .field("action", &self.action)
            .finish()
    }
}

struct Node {
    handle: SubscriberHandle,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Subscribers of a single path.
#[derive(Default)]
pub struct PathSubscription {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    index: HashMap<SubscriberId, usize>,
}

impl PathSubscription {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.index.contains_key(id)
    }

    /// Insert at the head. Returns `false` if `id` is already present.
    pub fn push_front(&mut self, id: SubscriberId, handle: SubscriberHandle) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        let node = Node {
            handle,
            prev: None,
            next: self.head,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                if let Some(entry) = self.slots.get_mut(slot) {
                    *entry = Some(node);
                }
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        if let Some(old_head) = self.head
            && let Some(Some(node)) = self.slots.get_mut(old_head)
        {
            node.prev = Some(slot);
        }
        self.head = Some(slot);
        self.index.insert(id, slot);
        true
    }

    /// Unlink the subscriber with `id`, re-linking its neighbours.
    pub fn remove(&mut self, id: &SubscriberId) -> Option<SubscriberHandle> {
        let slot = self.index.remove(id)?;
        let node = self.slots.get_mut(slot)?.take()?;
        match node.prev {
            Some(prev) => {
                if let Some(Some(prev_node)) = self.slots.get_mut(prev) {
                    prev_node.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        if let Some(next) = node.next
            && let Some(Some(next_node)) = self.slots.get_mut(next)
        {
            next_node.prev = node.prev;
        }
        self.free.push(slot);
        Some(node.handle)
    }

    /// Handles from head to tail.
    pub fn iter(&self) -> Subscribers<'_> {
        Subscribers {
            slots: &self.slots,
            cursor: self.head,
        }
    }
}

/// Iterator over a path's subscribers, head to tail.
pub struct Subscribers<'a> {
    slots: &'a [Option<Node>],
    cursor: Option<usize>,
}

impl<'a> Iterator for Subscribers<'a> {
    type Item = &'a SubscriberHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.slots.get(self.cursor?)?.as_ref()?;
        self.cursor = node.next;
        Some(&node.handle)
    }
}

/// Outcome of [`SubscriptionRegistry::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// First subscriber on the path; the path is now of interest to the server.
    PathCreated,
    Added,
    /// Same `(target, action)` was already subscribed; nothing changed.
    Duplicate,
}

/// Outcome of [`SubscriptionRegistry::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detach {
    /// No such path or subscriber; nothing changed.
    NotFound,
    Removed,
    /// Last subscriber gone; the path subscription was deleted.
    PathRemoved,
}

/// All path subscriptions. A path is present only while it has subscribers.
#[derive(Default)]
pub struct SubscriptionRegistry {
    paths: BTreeMap<String, PathSubscription>,
}

impl SubscriptionRegistry {
    pub fn connect(&mut self, path: &str, target: &Arc<dyn Target>, action: &Action) -> Attach {
        let id = SubscriberId::new(target, action);
        let handle = SubscriberHandle {
            target: Arc::clone(target),
            action: action.clone(),
        };
        match self.paths.get_mut(path) {
            Some(subscription) => {
                if subscription.push_front(id, handle) {
                    Attach::Added
                } else {
                    Attach::Duplicate
                }
            }
            None => {
                let mut subscription = PathSubscription::default();
                subscription.push_front(id, handle);
                self.paths.insert(path.to_string(), subscription);
                Attach::PathCreated
            }
        }
    }

    pub fn disconnect(&mut self, path: &str, target: &Arc<dyn Target>, action: &Action) -> Detach {
        let Some(subscription) = self.paths.get_mut(path) else {
            return Detach::NotFound;
        };
        let id = SubscriberId::new(target, action);
        if subscription.remove(&id).is_none() {
            return Detach::NotFound;
        }
        if subscription.is_empty() {
            self.paths.remove(path);
            Detach::PathRemoved
        } else {
            Detach::Removed
        }
    }

    pub fn get(&self, path: &str) -> Option<&PathSubscription> {
        self.paths.get(path)
    }

    /// Attached paths in lexicographic order.
    pub fn paths(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.paths.get(path).map_or(0, PathSubscription::len)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Target for Recorder {
        fn call_method(
            &self,
            method: &str,
            path: &str,
            _message: &serde_json::Value,
        ) -> Result<(), BoxError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}.{method}({path})", self.name));
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Target> {
        Arc::new(Recorder {
            name,
            log: Arc::clone(log),
        })
    }

    fn order(registry: &SubscriptionRegistry, path: &str) -> Vec<String> {
        registry
            .get(path)
            .map(|sub| sub.iter().map(|h| format!("{:?}", h.action)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn connect_creates_path_then_adds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let b = recorder("b", &log);
        let mut registry = SubscriptionRegistry::default();

        assert_eq!(
            registry.connect("/p", &a, &Action::method("on_update")),
            Attach::PathCreated
        );
        assert_eq!(
            registry.connect("/p", &b, &Action::method("on_update")),
            Attach::Added
        );
        assert_eq!(registry.subscriber_count("/p"), 2);
        assert_eq!(registry.paths(), vec!["/p".to_string()]);
    }

    #[test]
    fn duplicate_connect_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let mut registry = SubscriptionRegistry::default();
        let action = Action::method("on_update");

        registry.connect("/p", &a, &action);
        assert_eq!(registry.connect("/p", &a, &action), Attach::Duplicate);
        assert_eq!(
            registry.connect("/p", &a, &Action::method("on_update")),
            Attach::Duplicate
        );
        assert_eq!(registry.subscriber_count("/p"), 1);

        // Same target, different method: a distinct subscriber.
        assert_eq!(
            registry.connect("/p", &a, &Action::method("other")),
            Attach::Added
        );
        assert_eq!(registry.subscriber_count("/p"), 2);
    }

    #[test]
    fn callback_identity_is_the_arc() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let mut registry = SubscriptionRegistry::default();
        let cb = Action::callback(|_, _, _| Ok(()));

        registry.connect("/p", &a, &cb);
        assert_eq!(registry.connect("/p", &a, &cb.clone()), Attach::Duplicate);
        // A fresh closure allocation is a different subscriber.
        assert_eq!(
            registry.connect("/p", &a, &Action::callback(|_, _, _| Ok(()))),
            Attach::Added
        );
        assert_eq!(registry.disconnect("/p", &a, &cb), Detach::Removed);
        assert_eq!(registry.subscriber_count("/p"), 1);
    }

    #[test]
    fn same_subscriber_on_two_paths() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let mut registry = SubscriptionRegistry::default();
        let action = Action::method("on_update");

        assert_eq!(registry.connect("/x", &a, &action), Attach::PathCreated);
        assert_eq!(registry.connect("/y", &a, &action), Attach::PathCreated);
        assert_eq!(registry.disconnect("/x", &a, &action), Detach::PathRemoved);
        assert_eq!(registry.subscriber_count("/y"), 1);
    }

    #[test]
    fn disconnect_unknown_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let b = recorder("b", &log);
        let mut registry = SubscriptionRegistry::default();
        let action = Action::method("on_update");

        assert_eq!(registry.disconnect("/none", &a, &action), Detach::NotFound);

        registry.connect("/p", &a, &action);
        assert_eq!(registry.disconnect("/p", &b, &action), Detach::NotFound);
        assert_eq!(
            registry.disconnect("/p", &a, &Action::method("other")),
            Detach::NotFound
        );
        assert_eq!(registry.subscriber_count("/p"), 1);
    }

    #[test]
    fn last_disconnect_removes_path() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let b = recorder("b", &log);
        let mut registry = SubscriptionRegistry::default();
        let action = Action::method("on_update");

        registry.connect("/p", &a, &action);
        registry.connect("/p", &b, &action);
        assert_eq!(registry.disconnect("/p", &a, &action), Detach::Removed);
        assert!(registry.get("/p").is_some());
        assert_eq!(registry.disconnect("/p", &b, &action), Detach::PathRemoved);
        assert!(registry.get("/p").is_none());
        assert!(registry.is_empty());
        assert_eq!(registry.subscriber_count("/p"), 0);

        // Path can be re-created afterwards.
        assert_eq!(registry.connect("/p", &a, &action), Attach::PathCreated);
    }

    #[test]
    fn traversal_is_head_to_tail_newest_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let mut registry = SubscriptionRegistry::default();
        for name in ["first", "second", "third"] {
            registry.connect("/p", &a, &Action::method(name));
        }

        for handle in registry.get("/p").unwrap().iter() {
            handle.invoke("/p", &serde_json::Value::Null).unwrap();
        }
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a.third(/p)", "a.second(/p)", "a.first(/p)"]
        );
    }

    #[test]
    fn removal_relinks_neighbours() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let mut registry = SubscriptionRegistry::default();
        for name in ["m1", "m2", "m3", "m4"] {
            registry.connect("/p", &a, &Action::method(name));
        }
        // List is m4 m3 m2 m1. Remove middle, head, then tail.
        registry.disconnect("/p", &a, &Action::method("m2"));
        assert_eq!(
            order(&registry, "/p"),
            vec![r#"Method("m4")"#, r#"Method("m3")"#, r#"Method("m1")"#]
        );
        registry.disconnect("/p", &a, &Action::method("m4"));
        assert_eq!(
            order(&registry, "/p"),
            vec![r#"Method("m3")"#, r#"Method("m1")"#]
        );
        registry.disconnect("/p", &a, &Action::method("m1"));
        assert_eq!(order(&registry, "/p"), vec![r#"Method("m3")"#]);
    }

    #[test]
    fn freed_slots_are_reused() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let mut sub = PathSubscription::default();
        let handle = |name: &str| SubscriberHandle {
            target: Arc::clone(&a),
            action: Action::method(name),
        };
        let id = |name: &str| SubscriberId::new(&a, &Action::method(name));

        assert!(sub.push_front(id("x"), handle("x")));
        assert!(sub.push_front(id("y"), handle("y")));
        assert!(sub.remove(&id("x")).is_some());
        assert!(sub.push_front(id("z"), handle("z")));
        assert_eq!(sub.slots.len(), 2);
        assert_eq!(sub.len(), 2);
        assert!(sub.contains(&id("z")));
        assert!(!sub.contains(&id("x")));

        let order: Vec<_> = sub.iter().map(|h| format!("{:?}", h.action)).collect();
        assert_eq!(order, vec![r#"Method("z")"#, r#"Method("y")"#]);
    }

    #[test]
    fn default_call_method_reports_unknown_method() {
        struct Bare;
        impl Target for Bare {}

        let handle = SubscriberHandle {
            target: Arc::new(Bare),
            action: Action::method("missing"),
        };
        let err = handle.invoke("/p", &serde_json::Value::Null).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn paths_are_sorted() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let mut registry = SubscriptionRegistry::default();
        let action = Action::method("on_update");
        for path in ["/c", "/a", "/b"] {
            registry.connect(path, &a, &action);
        }
        assert_eq!(registry.paths(), vec!["/a", "/b", "/c"]);
    }
}
