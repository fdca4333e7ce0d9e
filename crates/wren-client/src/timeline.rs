use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use wren_types::api::MESSAGE_PAGE_SIZE;
use wren_types::models::{Message, Reaction};

/// How long a typing indicator stays visible without being renewed.
pub const TYPING_TTL: Duration = Duration::from_secs(2);

/// Loading phase of a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No page has been applied yet.
    Empty,
    /// A page fetch is in flight. Blocks further fetches, never events.
    Loading,
    /// At least one page applied and no fetch in flight.
    Ready,
}

/// One message with its render-grouping flags. Consecutive messages from
/// the same sender form a group.
#[derive(Debug)]
pub struct GroupedMessage<'a> {
    pub message: &'a Message,
    pub first_in_group: bool,
    pub last_in_group: bool,
}

/// Point-in-time copy of a timeline for rendering.
#[derive(Debug, Clone)]
pub struct TimelineSnapshot {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
    pub typing_users: Vec<Uuid>,
    pub load_state: LoadState,
    pub can_load_older: bool,
}

/// Merged view of one conversation: REST history pages and live events
/// folded into a single ordered message list.
///
/// Messages are kept ascending by `(created_at, id)` and deduplicated by
/// id, so pages and events may arrive overlapping, duplicated, or out of
/// order without corrupting the view. All methods are synchronous; the
/// async orchestration lives in [`crate::client::ChatClient`].
#[derive(Debug, Clone)]
pub struct Timeline {
    conversation_id: Uuid,
    messages: Vec<Message>,
    load_state: LoadState,
    has_more: bool,
    typing: HashMap<Uuid, Instant>,
}

impl Timeline {
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            load_state: LoadState::Empty,
            has_more: true,
            typing: HashMap::new(),
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Whether a scrollback fetch makes sense right now: history is not
    /// exhausted and no fetch is already in flight.
    pub fn can_load_older(&self) -> bool {
        self.load_state == LoadState::Ready && self.has_more
    }

    /// Pagination cursor for the next older page: the oldest loaded
    /// message's id.
    pub fn cursor(&self) -> Option<Uuid> {
        self.messages.first().map(|m| m.id)
    }

    /// Mark a fetch as in flight. Returns false if one already is, in
    /// which case the caller must not start another.
    pub fn begin_load(&mut self) -> bool {
        if self.load_state == LoadState::Loading {
            return false;
        }
        self.load_state = LoadState::Loading;
        true
    }

    /// Roll back `begin_load` after a failed fetch.
    pub fn abort_load(&mut self) {
        if self.load_state == LoadState::Loading {
            self.load_state = if self.messages.is_empty() {
                LoadState::Empty
            } else {
                LoadState::Ready
            };
        }
    }

    /// Splice one history page into the timeline. The page arrives newest
    /// first; a page shorter than the fixed page size means history is
    /// exhausted. The raw page length decides that, not the number of
    /// messages that survive deduplication.
    pub fn apply_page(&mut self, page: Vec<Message>) {
        self.has_more = page.len() == MESSAGE_PAGE_SIZE;
        for message in page.into_iter().rev() {
            self.insert(message);
        }
        self.load_state = LoadState::Ready;
    }

    /// Fold a live message into the timeline. Returns false when the
    /// message belongs to a different conversation and was dropped.
    /// Duplicates of already-loaded messages are absorbed silently.
    pub fn apply_incoming(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }
        self.insert(message);
        true
    }

    fn insert(&mut self, message: Message) {
        if message.conversation_id != self.conversation_id {
            return;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return;
        }
        let position = self
            .messages
            .binary_search_by_key(&message.sort_key(), Message::sort_key)
            .unwrap_or_else(|position| position);
        self.messages.insert(position, message);
    }

    /// Record a typing indicator. A start renews the user's deadline to
    /// `now + TYPING_TTL`; a stop removes the user immediately. Expired
    /// entries are pruned on the way through.
    pub fn apply_typing(&mut self, user_id: Uuid, is_typing: bool, now: Instant) {
        self.typing.retain(|_, deadline| *deadline > now);
        if is_typing {
            self.typing.insert(user_id, now + TYPING_TTL);
        } else {
            self.typing.remove(&user_id);
        }
    }

    /// Users whose typing deadline has not yet been reached, in a stable
    /// order.
    pub fn typing_users(&self, now: Instant) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self
            .typing
            .iter()
            .filter(|(_, deadline)| **deadline > now)
            .map(|(user, _)| *user)
            .collect();
        users.sort();
        users
    }

    /// Replace one message's reaction set with the authoritative one.
    /// Returns false when the message is not loaded; the update is then
    /// dropped and the set will arrive with the message's history page.
    pub fn apply_reaction_update(
        &mut self,
        message_id: Uuid,
        reactions: Vec<Reaction>,
    ) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.reactions = reactions;
                true
            }
            None => false,
        }
    }

    /// Messages annotated with grouping flags, derived from runs of the
    /// same sender.
    pub fn grouped(&self) -> Vec<GroupedMessage<'_>> {
        self.messages
            .iter()
            .enumerate()
            .map(|(i, message)| {
                let prev_same = i > 0 && self.messages[i - 1].sender_id == message.sender_id;
                let next_same = i + 1 < self.messages.len()
                    && self.messages[i + 1].sender_id == message.sender_id;
                GroupedMessage {
                    message,
                    first_in_group: !prev_same,
                    last_in_group: !next_same,
                }
            })
            .collect()
    }

    /// Case-insensitive substring search over loaded messages.
    pub fn search(&self, query: &str) -> Vec<&Message> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.messages
            .iter()
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn snapshot(&self, now: Instant) -> TimelineSnapshot {
        TimelineSnapshot {
            conversation_id: self.conversation_id,
            messages: self.messages.clone(),
            typing_users: self.typing_users(now),
            load_state: self.load_state,
            can_load_older: self.can_load_older(),
        }
    }
}
