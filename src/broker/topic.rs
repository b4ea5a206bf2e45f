//! Topic registry
//!
//! A `TopicRegistry` is a two-way membership index between topics (vehicle or
//! route ids) and subscriber handles (connection ids). The broker keeps two
//! of them, one per topic kind.
//!
//! Both directions live behind a single mutex and every operation updates
//! them under one acquisition, so no reader can see a handle listed under a
//! topic without the matching reverse entry. Empty sets are pruned on the
//! spot on both sides.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

pub type SubscriberId = String;

/// Which registry a topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Vehicle,
    Route,
}

impl TopicKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TopicKind::Vehicle => "vehicle",
            TopicKind::Route => "route",
        }
    }
}

#[derive(Debug, Default)]
struct Memberships {
    forward: HashMap<String, HashSet<SubscriberId>>,
    reverse: HashMap<SubscriberId, HashSet<String>>,
}

/// Point-in-time view of a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub topic_count: usize,
    pub handle_count: usize,
    pub total_memberships: usize,
    pub per_topic: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct TopicRegistry {
    kind: TopicKind,
    inner: Mutex<Memberships>,
}

impl TopicRegistry {
    pub fn new(kind: TopicKind) -> Self {
        Self {
            kind,
            inner: Mutex::new(Memberships::default()),
        }
    }

    pub fn kind(&self) -> TopicKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, Memberships> {
        // no mutation can unwind between the two index updates
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `handle` to `topic`. Returns `false` if it was already there.
    pub fn subscribe(&self, topic: &str, handle: &str) -> bool {
        let mut guard = self.lock();
        let m = &mut *guard;

        let created = m
            .forward
            .entry(topic.to_string())
            .or_default()
            .insert(handle.to_string());
        if created {
            m.reverse
                .entry(handle.to_string())
                .or_default()
                .insert(topic.to_string());
            tracing::debug!(kind = self.kind.as_str(), topic, handle, "subscribed");
        }
        created
    }

    /// Removes `handle` from `topic`. Returns `false` if it was not there.
    pub fn unsubscribe(&self, topic: &str, handle: &str) -> bool {
        let mut guard = self.lock();
        let m = &mut *guard;

        let removed = match m.forward.get_mut(topic) {
            Some(subscribers) => {
                let removed = subscribers.remove(handle);
                if subscribers.is_empty() {
                    m.forward.remove(topic);
                }
                removed
            }
            None => false,
        };

        if removed {
            if let Some(topics) = m.reverse.get_mut(handle) {
                topics.remove(topic);
                if topics.is_empty() {
                    m.reverse.remove(handle);
                }
            }
            tracing::debug!(kind = self.kind.as_str(), topic, handle, "unsubscribed");
        }
        removed
    }

    /// Handles subscribed to `topic`; empty for unknown topics.
    pub fn subscribers_of(&self, topic: &str) -> HashSet<SubscriberId> {
        self.lock().forward.get(topic).cloned().unwrap_or_default()
    }

    pub fn topics_of(&self, handle: &str) -> HashSet<String> {
        self.lock().reverse.get(handle).cloned().unwrap_or_default()
    }

    pub fn is_subscribed(&self, topic: &str, handle: &str) -> bool {
        self.lock()
            .forward
            .get(topic)
            .is_some_and(|subscribers| subscribers.contains(handle))
    }

    /// Drops every membership of `handle` and returns the topics it had.
    pub fn remove_handle(&self, handle: &str) -> Vec<String> {
        let mut guard = self.lock();
        let m = &mut *guard;

        let Some(topics) = m.reverse.remove(handle) else {
            return Vec::new();
        };

        for topic in &topics {
            if let Some(subscribers) = m.forward.get_mut(topic) {
                subscribers.remove(handle);
                if subscribers.is_empty() {
                    m.forward.remove(topic);
                }
            }
        }

        tracing::debug!(
            kind = self.kind.as_str(),
            handle,
            topics = topics.len(),
            "handle removed"
        );
        topics.into_iter().collect()
    }

    pub fn topic_count(&self) -> usize {
        self.lock().forward.len()
    }

    pub fn handle_count(&self) -> usize {
        self.lock().reverse.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let m = self.lock();
        let per_topic: BTreeMap<String, usize> = m
            .forward
            .iter()
            .map(|(topic, subscribers)| (topic.clone(), subscribers.len()))
            .collect();

        RegistrySnapshot {
            topic_count: m.forward.len(),
            handle_count: m.reverse.len(),
            total_memberships: per_topic.values().sum(),
            per_topic,
        }
    }

    /// Verifies that the forward and reverse indices describe the same set
    /// of memberships and hold no empty entries. Returns a description of
    /// the first violation found.
    pub fn check_consistency(&self) -> Result<(), String> {
        let m = self.lock();

        for (topic, subscribers) in &m.forward {
            if subscribers.is_empty() {
                return Err(format!("topic {topic} has an empty subscriber set"));
            }
            for handle in subscribers {
                let mirrored = m
                    .reverse
                    .get(handle)
                    .is_some_and(|topics| topics.contains(topic));
                if !mirrored {
                    return Err(format!("{handle} listed under {topic} but not reversed"));
                }
            }
        }

        for (handle, topics) in &m.reverse {
            if topics.is_empty() {
                return Err(format!("handle {handle} has an empty topic set"));
            }
            for topic in topics {
                let mirrored = m
                    .forward
                    .get(topic)
                    .is_some_and(|subscribers| subscribers.contains(handle));
                if !mirrored {
                    return Err(format!("{topic} listed under {handle} but not forwarded"));
                }
            }
        }

        Ok(())
    }
}
