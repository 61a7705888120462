//! Topic subscription registry

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};

use rb_protocol::{normalize_topic, EventCode, Selector, SessionId, SubscribeItem};

type Topic = Option<String>;

#[derive(Default)]
struct RegistryInner {
    /// selector → topic → subscribed sessions
    by_selector: HashMap<Selector, HashMap<Topic, HashSet<SessionId>>>,
    /// session → its subscriptions, for cleanup on disconnect
    by_session: HashMap<SessionId, HashSet<SubscribeItem>>,
}

impl RegistryInner {
    fn remove(&mut self, session: SessionId, selector: Selector, topic: &Topic) -> bool {
        let Some(topics) = self.by_selector.get_mut(&selector) else {
            return false;
        };
        let Some(sessions) = topics.get_mut(topic) else {
            return false;
        };
        if !sessions.remove(&session) {
            return false;
        }
        if sessions.is_empty() {
            topics.remove(topic);
        }
        if topics.is_empty() {
            self.by_selector.remove(&selector);
        }
        true
    }
}

/// Maps (selector, topic) pairs to the sessions subscribed to them.
///
/// A subscription without a topic only matches events published without a
/// topic; a subscription with a topic only matches that exact topic. Empty
/// topics are treated as no topic.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Returns true when it was not present yet.
    pub fn subscribe(&self, session: SessionId, item: &SubscribeItem) -> bool {
        let item = item.normalized();
        let mut inner = self.inner.lock();
        let added = inner
            .by_selector
            .entry(item.selector)
            .or_default()
            .entry(item.topic.clone())
            .or_default()
            .insert(session);
        inner.by_session.entry(session).or_default().insert(item);
        added
    }

    /// Remove a subscription. Returns false when it did not exist.
    pub fn unsubscribe(&self, session: SessionId, item: &SubscribeItem) -> bool {
        let item = item.normalized();
        let mut inner = self.inner.lock();
        if !inner.remove(session, item.selector, &item.topic) {
            return false;
        }
        if let Some(items) = inner.by_session.get_mut(&session) {
            items.remove(&item);
            if items.is_empty() {
                inner.by_session.remove(&session);
            }
        }
        true
    }

    /// Sessions subscribed to `code` under `topic`, de-duplicated and sorted.
    ///
    /// Both the exact selector and the group selector of the code are
    /// consulted.
    pub fn matching_sessions(&self, code: EventCode, topic: Option<&str>) -> Vec<SessionId> {
        let topic = normalize_topic(topic);
        let inner = self.inner.lock();

        let mut matched = BTreeSet::new();
        for selector in [Selector::event(code), Selector::group_of(code)] {
            if let Some(sessions) = inner
                .by_selector
                .get(&selector)
                .and_then(|topics| topics.get(&topic))
            {
                matched.extend(sessions.iter().copied());
            }
        }
        matched.into_iter().collect()
    }

    /// Whether `session` would receive `code` under `topic`
    pub fn is_subscribed(&self, session: SessionId, code: EventCode, topic: Option<&str>) -> bool {
        let topic = normalize_topic(topic);
        let inner = self.inner.lock();
        inner.by_session.get(&session).is_some_and(|items| {
            items
                .iter()
                .any(|item| item.selector.matches(code) && item.topic == topic)
        })
    }

    /// Remove every subscription of a session. Returns how many were removed.
    pub fn drop_session(&self, session: SessionId) -> usize {
        let mut inner = self.inner.lock();
        let Some(items) = inner.by_session.remove(&session) else {
            return 0;
        };
        for item in &items {
            inner.remove(session, item.selector, &item.topic);
        }
        items.len()
    }

    /// Subscriptions held by a session
    pub fn subscriptions_of(&self, session: SessionId) -> Vec<SubscribeItem> {
        let inner = self.inner.lock();
        let mut items: Vec<SubscribeItem> = inner
            .by_session
            .get(&session)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| (a.selector, &a.topic).cmp(&(b.selector, &b.topic)));
        items
    }

    /// Number of sessions holding at least one subscription
    pub fn session_count(&self) -> usize {
        self.inner.lock().by_session.len()
    }

    /// Total number of subscriptions
    pub fn len(&self) -> usize {
        self.inner.lock().by_session.values().map(HashSet::len).sum()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_session.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: SessionId = SessionId(1);
    const B: SessionId = SessionId(2);

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let item = SubscribeItem::event(100, Some("t1"));
        assert!(registry.subscribe(A, &item));
        assert!(!registry.subscribe(A, &item));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.matching_sessions(100, Some("t1")), vec![A]);
    }

    #[test]
    fn test_subscribe_then_unsubscribe_leaves_nothing() {
        let registry = SubscriptionRegistry::new();
        let item = SubscribeItem::event(100, Some("t1"));
        registry.subscribe(A, &item);
        assert!(registry.unsubscribe(A, &item));
        assert!(registry.matching_sessions(100, Some("t1")).is_empty());
        assert!(registry.is_empty());
        assert!(!registry.unsubscribe(A, &item));
    }

    #[test]
    fn test_topic_none_matches_only_untopicked() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(A, &SubscribeItem::event(100, None));
        registry.subscribe(B, &SubscribeItem::event(100, Some("t1")));

        assert_eq!(registry.matching_sessions(100, None), vec![A]);
        assert_eq!(registry.matching_sessions(100, Some("")), vec![A]);
        assert_eq!(registry.matching_sessions(100, Some("t1")), vec![B]);
        assert!(registry.matching_sessions(100, Some("t2")).is_empty());
    }

    #[test]
    fn test_group_subscription() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(A, &SubscribeItem::group(0x05, None));

        assert_eq!(registry.matching_sessions(0x05AB_1234, None), vec![A]);
        assert!(registry.matching_sessions(0x06AB_1234, None).is_empty());
        assert!(registry.is_subscribed(A, 0x0500_0001, None));
        assert!(!registry.is_subscribed(A, 0x0500_0001, Some("t")));
    }

    #[test]
    fn test_exact_and_group_deliver_once() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(B, &SubscribeItem::event(0x0500_0001, None));
        registry.subscribe(B, &SubscribeItem::group(0x05, None));
        registry.subscribe(A, &SubscribeItem::group(0x05, None));

        assert_eq!(registry.matching_sessions(0x0500_0001, None), vec![A, B]);
    }

    #[test]
    fn test_drop_session() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(A, &SubscribeItem::event(1, None));
        registry.subscribe(A, &SubscribeItem::group(2, Some("x")));
        registry.subscribe(B, &SubscribeItem::event(1, None));

        assert_eq!(registry.subscriptions_of(A).len(), 2);
        assert_eq!(registry.drop_session(A), 2);
        assert!(registry.subscriptions_of(A).is_empty());
        assert_eq!(registry.matching_sessions(1, None), vec![B]);
        assert!(registry.matching_sessions(0x0200_0000, Some("x")).is_empty());
        assert_eq!(registry.drop_session(A), 0);
        assert_eq!(registry.session_count(), 1);
    }
}
