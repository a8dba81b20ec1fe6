//! In-process stores for conversation, approval and support-tag state.
//!
//! Each store guards its map with a tokio lock; every operation is a single critical section.

use crate::domain::{ApprovalItem, ApprovalState, ConversationState, DomainError, MessageRef};
use crate::ports::{ApprovalStore, ConversationStore, SupportTagStore};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

/// user_id -> conversation state
#[derive(Default)]
pub struct MemoryConversationStore {
    cache: RwLock<HashMap<i64, ConversationState>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, user_id: i64) -> Result<ConversationState, DomainError> {
        Ok(self
            .cache
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, user_id: i64, state: ConversationState) -> Result<(), DomainError> {
        let mut cache = self.cache.write().await;
        if state == ConversationState::default() {
            cache.remove(&user_id);
        } else {
            cache.insert(user_id, state);
        }
        Ok(())
    }
}

/// approval-chat request message id -> pending item
#[derive(Default)]
pub struct MemoryApprovalStore {
    items: RwLock<HashMap<i32, ApprovalItem>>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn insert(&self, key: i32, item: ApprovalItem) -> Result<(), DomainError> {
        self.items.write().await.insert(key, item);
        Ok(())
    }

    async fn get(&self, key: i32) -> Result<Option<ApprovalItem>, DomainError> {
        Ok(self.items.read().await.get(&key).cloned())
    }

    async fn remove(&self, key: i32) -> Result<Option<ApprovalItem>, DomainError> {
        Ok(self.items.write().await.remove(&key))
    }

    async fn begin_revision(&self, key: i32, prompt_id: Option<i32>) -> Result<bool, DomainError> {
        let mut items = self.items.write().await;
        match items.get_mut(&key) {
            Some(item) => {
                item.state = ApprovalState::AwaitingRevisionReason;
                if prompt_id.is_some() {
                    item.revision_prompt = prompt_id;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn take_revision(
        &self,
        reply_to: i32,
    ) -> Result<Option<(i32, ApprovalItem)>, DomainError> {
        let mut items = self.items.write().await;
        let key = items
            .iter()
            .find(|(key, item)| {
                item.state == ApprovalState::AwaitingRevisionReason
                    && (**key == reply_to || item.revision_prompt == Some(reply_to))
            })
            .map(|(key, _)| *key);
        Ok(key.and_then(|k| items.remove(&k).map(|item| (k, item))))
    }
}

/// Tags kept before the oldest ones are forgotten.
pub const DEFAULT_TAG_CAPACITY: usize = 10_000;

#[derive(Default)]
struct Tags {
    set: HashSet<MessageRef>,
    order: VecDeque<MessageRef>,
}

/// Bounded set of tagged origins; the oldest tag is evicted once full.
pub struct MemorySupportTags {
    capacity: usize,
    tags: RwLock<Tags>,
}

impl MemorySupportTags {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TAG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tags: RwLock::new(Tags::default()),
        }
    }
}

impl Default for MemorySupportTags {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SupportTagStore for MemorySupportTags {
    async fn tag(&self, origin: MessageRef) -> Result<(), DomainError> {
        let mut tags = self.tags.write().await;
        if !tags.set.insert(origin) {
            return Ok(());
        }
        tags.order.push_back(origin);
        while tags.order.len() > self.capacity {
            if let Some(oldest) = tags.order.pop_front() {
                tags.set.remove(&oldest);
            }
        }
        Ok(())
    }

    async fn is_tagged(&self, origin: MessageRef) -> Result<bool, DomainError> {
        Ok(self.tags.read().await.set.contains(&origin))
    }
}
