//! Bounded conversation history for one session.
//!
//! [`ConversationStore`] is a single aggregate holding:
//!
//! - a FIFO-capped sequence of curated turns (oldest evicted first),
//! - two pinned slots (`thread_summary`, `state_facts`) that live outside the
//!   cap and are replaced wholesale,
//! - an unbounded usage history kept for diagnostics only.
//!
//! The store is the only writer of its items. Packing reads it through
//! [`recent_items`](ConversationStore::recent_items) and never mutates it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Role;

/// Default cap on retained items.
pub const DEFAULT_MAX_KEPT_MESSAGES: usize = 40;

/// A curated turn. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationItem {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Token usage reported by the decision engine for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub recorded_at: DateTime<Utc>,
}

impl UsageSnapshot {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            recorded_at: Utc::now(),
        }
    }
}

/// Bounded, append-only history plus pinned summary and facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStore {
    items: VecDeque<ConversationItem>,
    max_kept_messages: usize,
    thread_summary: Option<String>,
    state_facts: Option<String>,
    usage: Vec<UsageSnapshot>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEPT_MESSAGES)
    }
}

impl ConversationStore {
    /// Create an empty store retaining at most `max_kept_messages` items.
    pub fn new(max_kept_messages: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_kept_messages,
            thread_summary: None,
            state_facts: None,
            usage: Vec::new(),
        }
    }

    /// Append a user turn.
    pub fn add_user(&mut self, text: impl Into<String>) {
        self.push(ConversationItem::new(Role::User, text));
    }

    /// Append an assistant turn.
    pub fn add_assistant(&mut self, text: impl Into<String>) {
        self.push(ConversationItem::new(Role::Assistant, text));
    }

    /// Append a system note. Kept in the sequence for bookkeeping but never
    /// returned by [`recent_items`](Self::recent_items).
    pub fn add_system(&mut self, text: impl Into<String>) {
        self.push(ConversationItem::new(Role::System, text));
    }

    fn push(&mut self, item: ConversationItem) {
        self.items.push_back(item);
        while self.items.len() > self.max_kept_messages {
            self.items.pop_front();
        }
    }

    /// Replace the pinned thread summary. `None` clears it.
    pub fn set_thread_summary(&mut self, summary: Option<String>) {
        self.thread_summary = summary;
    }

    /// Replace the pinned key facts. `None` clears it.
    pub fn set_state_facts(&mut self, facts: Option<String>) {
        self.state_facts = facts;
    }

    pub fn thread_summary(&self) -> Option<&str> {
        self.thread_summary.as_deref()
    }

    pub fn state_facts(&self) -> Option<&str> {
        self.state_facts.as_deref()
    }

    /// Record engine usage. Diagnostic only; unbounded and not packed.
    pub fn record_usage(&mut self, snapshot: UsageSnapshot) {
        self.usage.push(snapshot);
    }

    pub fn usage_history(&self) -> &[UsageSnapshot] {
        &self.usage
    }

    /// The last `k` user/assistant items in chronological order.
    pub fn recent_items(&self, k: usize) -> Vec<&ConversationItem> {
        if k == 0 {
            return Vec::new();
        }
        let mut recent: Vec<&ConversationItem> = self
            .items
            .iter()
            .rev()
            .filter(|item| matches!(item.role, Role::User | Role::Assistant))
            .take(k)
            .collect();
        recent.reverse();
        recent
    }

    /// All retained items, oldest first.
    pub fn items(&self) -> impl Iterator<Item = &ConversationItem> {
        self.items.iter()
    }

    /// Reset items, pinned fields, and usage history.
    pub fn clear(&mut self) {
        self.items.clear();
        self.thread_summary = None;
        self.state_facts = None;
        self.usage.clear();
    }

    pub fn max_kept_messages(&self) -> usize {
        self.max_kept_messages
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_sets_roles() {
        let mut store = ConversationStore::new(10);
        store.add_user("hi");
        store.add_assistant("hello");
        let roles: Vec<Role> = store.items().map(|i| i.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let cap = 5;
        let mut store = ConversationStore::new(cap);
        for i in 0..cap + 3 {
            store.add_user(format!("m{i}"));
        }
        assert_eq!(store.len(), cap);
        let contents: Vec<&str> = store.items().map(|i| i.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4", "m5", "m6", "m7"]);
    }

    #[test]
    fn recent_items_zero_is_empty() {
        let mut store = ConversationStore::new(10);
        store.add_user("a");
        assert!(store.recent_items(0).is_empty());
    }

    #[test]
    fn recent_items_are_chronological_and_skip_system() {
        let mut store = ConversationStore::new(10);
        store.add_user("u1");
        store.add_assistant("a1");
        store.add_system("note");
        store.add_user("u2");
        let recent: Vec<&str> = store
            .recent_items(2)
            .into_iter()
            .map(|i| i.content.as_str())
            .collect();
        assert_eq!(recent, ["a1", "u2"]);
    }

    #[test]
    fn recent_items_larger_than_history() {
        let mut store = ConversationStore::new(10);
        store.add_user("only");
        assert_eq!(store.recent_items(8).len(), 1);
    }

    #[test]
    fn pinned_fields_survive_eviction() {
        let mut store = ConversationStore::new(1);
        store.set_thread_summary(Some("summary".into()));
        store.set_state_facts(Some("facts".into()));
        store.add_user("a");
        store.add_user("b");
        assert_eq!(store.thread_summary(), Some("summary"));
        assert_eq!(store.state_facts(), Some("facts"));
        store.set_thread_summary(None);
        assert_eq!(store.thread_summary(), None);
    }

    #[test]
    fn clear_resets_everything() {
        let mut store = ConversationStore::new(10);
        store.add_user("a");
        store.set_thread_summary(Some("s".into()));
        store.set_state_facts(Some("f".into()));
        store.record_usage(UsageSnapshot::new(10, 5));
        store.clear();
        assert!(store.is_empty());
        assert!(store.thread_summary().is_none());
        assert!(store.state_facts().is_none());
        assert!(store.usage_history().is_empty());
    }

    #[test]
    fn usage_history_is_unbounded() {
        let mut store = ConversationStore::new(1);
        for _ in 0..5 {
            store.record_usage(UsageSnapshot::new(100, 20));
        }
        assert_eq!(store.usage_history().len(), 5);
        assert_eq!(store.usage_history()[0].total_tokens, 120);
    }

    #[test]
    fn item_ids_are_unique() {
        let mut store = ConversationStore::new(10);
        store.add_user("a");
        store.add_user("a");
        let ids: Vec<&str> = store.items().map(|i| i.id.as_str()).collect();
        assert_ne!(ids[0], ids[1]);
    }
}
