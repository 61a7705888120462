//! Event cache
//!
//! Keeps the last payload of every (event, topic) pair a server published
//! so late subscribers and getters can be answered immediately. The cache
//! also decides whether a publish is worth broadcasting at all: repeating an
//! unchanged value is suppressed unless either side asks for every update.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rb_protocol::{normalize_topic, EventCode, Selector};

use crate::event::Event;

type CacheKey = (EventCode, Option<String>);

#[derive(Debug, Clone)]
struct CachedEvent {
    payload: Bytes,
    always_update: bool,
}

#[derive(Default)]
struct CacheInner {
    enabled: bool,
    entries: HashMap<CacheKey, CachedEvent>,
}

/// Last-value store keyed by event code and topic
#[derive(Default)]
pub struct EventCache {
    inner: Mutex<CacheInner>,
}

impl EventCache {
    /// Create a disabled cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the cache. Disabling drops every entry.
    pub fn enable(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        inner.enabled = enabled;
        if !enabled {
            inner.entries.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Seed or reset an entry. Ignored while the cache is disabled.
    pub fn init(
        &self,
        code: EventCode,
        topic: Option<&str>,
        payload: Bytes,
        always_update: bool,
    ) -> bool {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return false;
        }
        inner.entries.insert(
            (code, normalize_topic(topic)),
            CachedEvent {
                payload,
                always_update,
            },
        );
        true
    }

    /// Record a published value and decide whether to broadcast it.
    ///
    /// Returns false only when the cached payload is identical and neither
    /// this publish nor the entry asks for every update.
    pub fn publish(
        &self,
        code: EventCode,
        topic: Option<&str>,
        payload: Bytes,
        always_update: bool,
    ) -> bool {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return true;
        }

        match inner.entries.entry((code, normalize_topic(topic))) {
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if entry.payload == payload && !always_update && !entry.always_update {
                    return false;
                }
                entry.payload = payload;
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(CachedEvent {
                    payload,
                    always_update,
                });
                true
            }
        }
    }

    /// Cached payload, if the cache is enabled and holds one
    pub fn get(&self, code: EventCode, topic: Option<&str>) -> Option<Bytes> {
        let inner = self.inner.lock();
        if !inner.enabled {
            return None;
        }
        inner
            .entries
            .get(&(code, normalize_topic(topic)))
            .map(|entry| entry.payload.clone())
    }

    /// Every cached event a subscription to `selector`/`topic` covers, by code
    pub fn matching(&self, selector: Selector, topic: Option<&str>) -> Vec<Event> {
        let topic = normalize_topic(topic);
        let inner = self.inner.lock();
        if !inner.enabled {
            return Vec::new();
        }
        let mut events: Vec<Event> = inner
            .entries
            .iter()
            .filter(|((code, entry_topic), _)| selector.matches(*code) && *entry_topic == topic)
            .map(|((code, entry_topic), entry)| {
                Event::new(*code, entry_topic.clone(), entry.payload.clone())
            })
            .collect();
        events.sort_by_key(|event| event.code);
        events
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
