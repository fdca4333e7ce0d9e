use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user, as the REST boundary returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name to show for this user: display name when set, username otherwise.
    pub fn display_label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Member,
}

/// A user as they appear in a conversation's participant list.
///
/// The boundary historically delivered either a bare user id or a full
/// object. Both wire shapes deserialize into this one struct; nothing
/// downstream re-inspects the shape.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<ParticipantRole>,
}

impl Participant {
    /// Name to show for this participant; falls back to the id.
    pub fn display_label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

impl<'de> Deserialize<'de> for Participant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Full {
                id: Uuid,
                display_name: Option<String>,
                avatar_url: Option<String>,
                role: Option<ParticipantRole>,
            },
            Id(Uuid),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Id(id) => Participant {
                id,
                display_name: None,
                avatar_url: None,
                role: None,
            },
            Wire::Full {
                id,
                display_name,
                avatar_url,
                role,
            } => Participant {
                id,
                display_name,
                avatar_url,
                role,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationKind {
    #[serde(rename = "direct_message")]
    Direct,
    #[serde(rename = "group")]
    Group,
}

/// Denormalized pointer to a conversation's most recent message, kept for
/// the list preview only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A direct (2-party) or group (N-party) messaging thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub participants: Vec<Participant>,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Longest preview line shown in the conversation list.
const PREVIEW_CHARS: usize = 30;

impl Conversation {
    pub fn is_direct(&self) -> bool {
        self.kind == ConversationKind::Direct
    }

    /// The participant who is not `viewer`. Meaningful for direct
    /// conversations; for groups it returns an arbitrary other member.
    pub fn other_participant(&self, viewer: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id != viewer)
    }

    /// Derived name: a group's own name, or the other participant's name
    /// for direct conversations.
    pub fn display_name(&self, viewer: Uuid) -> String {
        if self.kind == ConversationKind::Group {
            if let Some(name) = &self.name {
                return name.clone();
            }
        }
        match self.other_participant(viewer) {
            Some(other) => other.display_label(),
            None => "Direct message".to_string(),
        }
    }

    /// Short preview line for the conversation list.
    pub fn preview(&self) -> String {
        match &self.last_message {
            Some(last) => {
                if last.content.chars().count() > PREVIEW_CHARS {
                    let truncated: String = last.content.chars().take(PREVIEW_CHARS).collect();
                    format!("{}...", truncated)
                } else {
                    last.content.clone()
                }
            }
            None => match self.kind {
                ConversationKind::Group => "Group chat".to_string(),
                ConversationKind::Direct => "Direct message".to_string(),
            },
        }
    }

    /// Whether `user` holds the group's admin role (required to remove
    /// members). Always false for direct conversations.
    pub fn is_admin(&self, user: Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.id == user && p.role == Some(ParticipantRole::Admin))
    }
}

/// Per-user, per-message emotive tag. A reactor has at most one active
/// reaction per message; a new one replaces the prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Haha,
    Sad,
    Angry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub kind: ReactionKind,
}

/// A chat message. Immutable once created, except for its reaction set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Total-order key within a timeline: `created_at`, ties broken by id.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Blocked,
}

/// A directional friendship edge: requester != addressee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friendship {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub addressee_id: Uuid,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: Uuid, name: Option<&str>, role: Option<ParticipantRole>) -> Participant {
        Participant {
            id,
            display_name: name.map(String::from),
            avatar_url: None,
            role,
        }
    }

    fn conversation(kind: ConversationKind, participants: Vec<Participant>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            kind,
            name: None,
            participants,
            last_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn participant_accepts_bare_id() {
        let id = Uuid::new_v4();
        let p: Participant = serde_json::from_value(serde_json::json!(id.to_string())).unwrap();
        assert_eq!(p.id, id);
        assert!(p.display_name.is_none());
        assert!(p.role.is_none());
    }

    #[test]
    fn participant_accepts_full_object() {
        let id = Uuid::new_v4();
        let p: Participant = serde_json::from_value(serde_json::json!({
            "id": id.to_string(),
            "display_name": "Mai",
            "avatar_url": null,
            "role": "admin",
        }))
        .unwrap();
        assert_eq!(p.id, id);
        assert_eq!(p.display_name.as_deref(), Some("Mai"));
        assert_eq!(p.role, Some(ParticipantRole::Admin));
    }

    #[test]
    fn direct_display_name_uses_other_participant() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let conv = conversation(
            ConversationKind::Direct,
            vec![
                participant(me, Some("Me"), None),
                participant(other, Some("An"), None),
            ],
        );
        assert_eq!(conv.display_name(me), "An");
        assert_eq!(conv.display_name(other), "Me");
    }

    #[test]
    fn unnamed_participant_falls_back_to_id() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let conv = conversation(
            ConversationKind::Direct,
            vec![participant(me, None, None), participant(other, None, None)],
        );
        assert_eq!(conv.display_name(me), other.to_string());
    }

    #[test]
    fn group_display_name_prefers_group_name() {
        let me = Uuid::new_v4();
        let mut conv = conversation(
            ConversationKind::Group,
            vec![
                participant(me, None, Some(ParticipantRole::Admin)),
                participant(Uuid::new_v4(), Some("An"), Some(ParticipantRole::Member)),
            ],
        );
        conv.name = Some("Weekend plans".to_string());
        assert_eq!(conv.display_name(me), "Weekend plans");
    }

    #[test]
    fn preview_truncates_long_content() {
        let mut conv = conversation(ConversationKind::Direct, vec![]);
        conv.last_message = Some(LastMessage {
            content: "a".repeat(50),
            created_at: Utc::now(),
        });
        assert_eq!(conv.preview(), format!("{}...", "a".repeat(30)));

        conv.last_message = Some(LastMessage {
            content: "short".to_string(),
            created_at: Utc::now(),
        });
        assert_eq!(conv.preview(), "short");
    }

    #[test]
    fn admin_check_requires_admin_role() {
        let admin = Uuid::new_v4();
        let member = Uuid::new_v4();
        let conv = conversation(
            ConversationKind::Group,
            vec![
                participant(admin, None, Some(ParticipantRole::Admin)),
                participant(member, None, Some(ParticipantRole::Member)),
            ],
        );
        assert!(conv.is_admin(admin));
        assert!(!conv.is_admin(member));
        assert!(!conv.is_admin(Uuid::new_v4()));
    }

    #[test]
    fn reaction_kind_wire_names_are_lowercase() {
        assert_eq!(
            serde_json::to_value(ReactionKind::Haha).unwrap(),
            serde_json::json!("haha")
        );
        let kind: ReactionKind = serde_json::from_value(serde_json::json!("angry")).unwrap();
        assert_eq!(kind, ReactionKind::Angry);
        // Outside the closed set is an error, not a silent default.
        assert!(serde_json::from_value::<ReactionKind>(serde_json::json!("wow")).is_err());
    }
}
