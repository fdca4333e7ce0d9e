use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Reaction, ReactionKind};

/// Events pushed from the server over the realtime channel.
///
/// Wire form is `{"type": "...", "data": {...}}`; the tag names below are
/// the protocol and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A message was created in a conversation the session can see,
    /// including the session user's own sends echoed back.
    ReceiveMessage(Message),
    /// A participant started or stopped typing.
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    /// Authoritative replacement of one message's reaction set.
    ReactionUpdate {
        message_id: Uuid,
        reactions: Vec<Reaction>,
    },
}

impl ServerEvent {
    /// The conversation this event is scoped to, when it carries one.
    /// `ReactionUpdate` is keyed by message id only.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::ReceiveMessage(message) => Some(message.conversation_id),
            ServerEvent::Typing {
                conversation_id, ..
            } => Some(*conversation_id),
            ServerEvent::ReactionUpdate { .. } => None,
        }
    }
}

/// Commands a client sends upstream over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    SendMessage {
        conversation_id: Uuid,
        content: String,
    },
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
    SendReaction {
        message_id: Uuid,
        reaction_type: ReactionKind,
    },
}
