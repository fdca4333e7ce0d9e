use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Conversation, ConversationKind, Friendship, User};

/// Messages are paginated in fixed pages of this size. A response holding
/// strictly fewer messages means history is exhausted.
pub const MESSAGE_PAGE_SIZE: usize = 20;

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub participant_ids: Vec<Uuid>,
}

/// Creating a direct conversation with someone you already share one with
/// returns the existing conversation instead of a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationResponse {
    pub conversation: Conversation,
    pub is_existing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddParticipantsRequest {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParticipantsResponse {
    pub conversation: Conversation,
    pub added_count: usize,
}

// -- Friends --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FriendRequestCreate {
    pub addressee_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestAction {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FriendRequestRespond {
    pub action: FriendRequestAction,
}

/// A pending or sent friend request together with the counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestEntry {
    pub friendship: Friendship,
    pub user: User,
}

// -- Profile --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

// -- Errors --

/// Error body the REST boundary returns alongside non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}
