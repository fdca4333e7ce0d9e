use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wren_types::api::CreateConversationRequest;
use wren_types::events::{ClientCommand, ServerEvent};
use wren_types::models::{Conversation, ConversationKind, Message, ReactionKind};

use crate::config::ClientConfig;
use crate::debounce::Debounce;
use crate::error::{Error, Result};
use crate::rest::RestClient;
use crate::session::{ChatSession, SessionEvent};
use crate::timeline::{Timeline, TimelineSnapshot};

/// Quiet period after the last keystroke before a typing stop is sent.
pub const TYPING_DEBOUNCE: Duration = Duration::from_secs(2);

/// Orchestrates one user's chat state: the REST boundary for history and
/// conversation management, the realtime session for live events, and the
/// timeline of whichever conversation is open.
///
/// Live events keep applying while history fetches are in flight; the
/// timeline lock is never held across an await of the network.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

struct Inner {
    rest: RestClient,
    session: ChatSession,
    local_user: Uuid,

    /// Timeline of the open conversation, if any.
    timeline: RwLock<Option<Timeline>>,

    /// Cached conversation list, most recently active first.
    conversations: RwLock<Vec<Conversation>>,

    /// Pending debounced typing stop, if any.
    typing_debounce: Debounce,

    pump: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChatClient {
    /// Authenticate against the REST boundary and open a realtime session.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let rest = RestClient::new(&config.api_url, &config.token);
        let me = rest.me().await?;
        info!("Authenticated as {} ({})", me.username, me.id);

        let session = ChatSession::connect(&config.gateway_url, &config.token).await?;
        Ok(Self::with_session(rest, session, me.id))
    }

    pub(crate) fn with_session(rest: RestClient, session: ChatSession, local_user: Uuid) -> Self {
        let events = session.subscribe();
        let inner = Arc::new(Inner {
            rest,
            session,
            local_user,
            timeline: RwLock::new(None),
            conversations: RwLock::new(Vec::new()),
            typing_debounce: Debounce::new(),
            pump: std::sync::Mutex::new(None),
        });

        let pump = tokio::spawn(run_pump(Arc::downgrade(&inner), events));
        *inner.pump.lock().expect("pump lock poisoned") = Some(pump);

        Self { inner }
    }

    pub fn local_user(&self) -> Uuid {
        self.inner.local_user
    }

    /// Direct access to the REST boundary, for operations outside the
    /// sync core (profile, friends, user search).
    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    /// Subscribe to raw session events, e.g. to drive re-renders.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.session.subscribe()
    }

    /// Refetch the conversation list and cache it, most recently active
    /// first.
    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>> {
        let mut conversations = self.inner.rest.list_conversations().await?;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        *self.inner.conversations.write().await = conversations.clone();
        Ok(conversations)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.inner.conversations.read().await.clone()
    }

    /// Open a direct conversation with `user_id`. A cached one is reused
    /// without a round trip; otherwise the server either creates one or
    /// reports the duplicate it already has.
    pub async fn start_direct(&self, user_id: Uuid) -> Result<Conversation> {
        {
            let cache = self.inner.conversations.read().await;
            if let Some(existing) = cache.iter().find(|c| {
                c.is_direct()
                    && c.other_participant(self.inner.local_user)
                        .is_some_and(|p| p.id == user_id)
            }) {
                return Ok(existing.clone());
            }
        }

        let response = self
            .inner
            .rest
            .create_conversation(&CreateConversationRequest {
                kind: ConversationKind::Direct,
                name: None,
                participant_ids: vec![user_id],
            })
            .await?;
        if response.is_existing {
            debug!("Reusing existing direct conversation {}", response.conversation.id);
        }
        self.remember_conversation(response.conversation.clone()).await;
        Ok(response.conversation)
    }

    pub async fn create_group(&self, name: &str, member_ids: Vec<Uuid>) -> Result<Conversation> {
        let response = self
            .inner
            .rest
            .create_conversation(&CreateConversationRequest {
                kind: ConversationKind::Group,
                name: Some(name.to_string()),
                participant_ids: member_ids,
            })
            .await?;
        self.remember_conversation(response.conversation.clone()).await;
        Ok(response.conversation)
    }

    pub async fn add_participants(
        &self,
        conversation_id: Uuid,
        user_ids: Vec<Uuid>,
    ) -> Result<Conversation> {
        let response = self
            .inner
            .rest
            .add_participants(conversation_id, &user_ids)
            .await?;
        self.remember_conversation(response.conversation.clone()).await;
        Ok(response.conversation)
    }

    pub async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        self.inner
            .rest
            .remove_participant(conversation_id, user_id)
            .await?;
        let mut cache = self.inner.conversations.write().await;
        if let Some(conversation) = cache.iter_mut().find(|c| c.id == conversation_id) {
            conversation.participants.retain(|p| p.id != user_id);
        }
        Ok(())
    }

    /// Open a conversation: reset the timeline and fetch the newest
    /// history page. Any page still in flight for a previously open
    /// conversation is discarded when it lands.
    pub async fn open_conversation(&self, conversation_id: Uuid) -> Result<()> {
        {
            let mut guard = self.inner.timeline.write().await;
            let mut timeline = Timeline::new(conversation_id);
            timeline.begin_load();
            *guard = Some(timeline);
        }
        self.inner.typing_debounce.cancel();

        match self.inner.rest.fetch_messages(conversation_id, None).await {
            Ok(page) => {
                self.apply_fetched_page(conversation_id, page).await;
                Ok(())
            }
            Err(err) => {
                self.abort_fetch(conversation_id).await;
                Err(err)
            }
        }
    }

    /// Drop the open conversation's timeline.
    pub async fn close_conversation(&self) {
        *self.inner.timeline.write().await = None;
        self.inner.typing_debounce.cancel();
    }

    /// Fetch the next older history page for the open conversation.
    /// A call while a fetch is in flight, or once history is exhausted,
    /// is a no-op.
    pub async fn load_older(&self) -> Result<()> {
        let (conversation_id, cursor) = {
            let mut guard = self.inner.timeline.write().await;
            let Some(timeline) = guard.as_mut() else {
                return Err(Error::NoOpenConversation);
            };
            if !timeline.can_load_older() {
                return Ok(());
            }
            timeline.begin_load();
            (timeline.conversation_id(), timeline.cursor())
        };

        match self.inner.rest.fetch_messages(conversation_id, cursor).await {
            Ok(page) => {
                self.apply_fetched_page(conversation_id, page).await;
                Ok(())
            }
            Err(err) => {
                self.abort_fetch(conversation_id).await;
                Err(err)
            }
        }
    }

    /// Send a message to the open conversation. Content is trimmed and
    /// must be non-empty; delivery is confirmed by the server echoing the
    /// message back, so nothing is inserted locally here.
    pub async fn send_message(&self, content: &str) -> Result<()> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyMessage);
        }
        let conversation_id = self
            .current_conversation()
            .await
            .ok_or(Error::NoOpenConversation)?;

        self.inner.session.emit(ClientCommand::SendMessage {
            conversation_id,
            content: trimmed.to_string(),
        })?;

        // Sending ends the typing episode.
        self.inner.typing_debounce.cancel();
        self.inner.session.emit(ClientCommand::Typing {
            conversation_id,
            is_typing: false,
        })?;
        Ok(())
    }

    /// Report keystroke activity. Every call announces typing again, since
    /// receivers expire indicators on a short TTL and rely on the renewals,
    /// and pushes the debounced stop out by another [`TYPING_DEBOUNCE`].
    pub async fn notify_typing(&self) -> Result<()> {
        let conversation_id = self
            .current_conversation()
            .await
            .ok_or(Error::NoOpenConversation)?;

        self.inner.session.emit(ClientCommand::Typing {
            conversation_id,
            is_typing: true,
        })?;

        let inner = Arc::downgrade(&self.inner);
        self.inner.typing_debounce.arm(TYPING_DEBOUNCE, async move {
            if let Some(inner) = inner.upgrade() {
                let _ = inner.session.emit(ClientCommand::Typing {
                    conversation_id,
                    is_typing: false,
                });
            }
        });
        Ok(())
    }

    /// End the typing episode right away, e.g. when the input is cleared.
    pub async fn stop_typing(&self) -> Result<()> {
        let conversation_id = self
            .current_conversation()
            .await
            .ok_or(Error::NoOpenConversation)?;

        self.inner.typing_debounce.cancel();
        self.inner.session.emit(ClientCommand::Typing {
            conversation_id,
            is_typing: false,
        })
    }

    /// Ask the server to set or replace this user's reaction. The new
    /// reaction set comes back as a reaction update event.
    pub fn send_reaction(&self, message_id: Uuid, kind: ReactionKind) -> Result<()> {
        self.inner.session.emit(ClientCommand::SendReaction {
            message_id,
            reaction_type: kind,
        })
    }

    /// Snapshot of the open conversation's timeline, if any.
    pub async fn timeline(&self) -> Option<TimelineSnapshot> {
        let guard = self.inner.timeline.read().await;
        guard.as_ref().map(|t| t.snapshot(Instant::now()))
    }

    async fn current_conversation(&self) -> Option<Uuid> {
        self.inner
            .timeline
            .read()
            .await
            .as_ref()
            .map(|t| t.conversation_id())
    }

    /// Apply a finished fetch, unless the open conversation changed while
    /// it was in flight.
    async fn apply_fetched_page(&self, conversation_id: Uuid, page: Vec<Message>) {
        let mut guard = self.inner.timeline.write().await;
        match guard.as_mut() {
            Some(timeline) if timeline.conversation_id() == conversation_id => {
                timeline.apply_page(page);
            }
            _ => debug!("Discarding stale page for conversation {}", conversation_id),
        }
    }

    async fn abort_fetch(&self, conversation_id: Uuid) {
        let mut guard = self.inner.timeline.write().await;
        if let Some(timeline) = guard.as_mut() {
            if timeline.conversation_id() == conversation_id {
                timeline.abort_load();
            }
        }
    }

    async fn remember_conversation(&self, conversation: Conversation) {
        let mut cache = self.inner.conversations.write().await;
        match cache.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => cache.insert(0, conversation),
        }
    }
}

impl Inner {
    async fn apply_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::ReceiveMessage(message) => {
                let message_id = message.id;
                let conversation_id = message.conversation_id;
                let mut guard = self.timeline.write().await;
                let applied = guard
                    .as_mut()
                    .map(|timeline| timeline.apply_incoming(message))
                    .unwrap_or(false);
                if !applied {
                    debug!(
                        "Dropping message {} for inactive conversation {}",
                        message_id, conversation_id
                    );
                }
            }
            ServerEvent::Typing {
                conversation_id,
                user_id,
                is_typing,
            } => {
                if user_id == self.local_user {
                    return;
                }
                let mut guard = self.timeline.write().await;
                if let Some(timeline) = guard.as_mut() {
                    if timeline.conversation_id() == conversation_id {
                        timeline.apply_typing(user_id, is_typing, Instant::now());
                    }
                }
            }
            ServerEvent::ReactionUpdate {
                message_id,
                reactions,
            } => {
                let mut guard = self.timeline.write().await;
                let applied = guard
                    .as_mut()
                    .map(|timeline| timeline.apply_reaction_update(message_id, reactions))
                    .unwrap_or(false);
                if !applied {
                    debug!("Dropping reaction update for unloaded message {}", message_id);
                }
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().expect("pump lock poisoned").take() {
            pump.abort();
        }
    }
}

async fn run_pump(inner: Weak<Inner>, mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Event(event)) => match inner.upgrade() {
                Some(inner) => inner.apply_event(event).await,
                None => break,
            },
            Ok(SessionEvent::Closed) => {
                info!("Session closed, event pump stopping");
                break;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event pump lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::LoadState;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use wren_types::models::Reaction;

    fn test_client() -> (ChatClient, mpsc::UnboundedReceiver<ClientCommand>) {
        let (session, commands) = ChatSession::in_memory();
        let rest = RestClient::new("http://127.0.0.1:9", "test-token");
        let client = ChatClient::with_session(rest, session, Uuid::new_v4());
        (client, commands)
    }

    /// Install an empty, fully loaded timeline without touching REST.
    async fn open_empty(client: &ChatClient, conversation_id: Uuid) {
        let mut timeline = Timeline::new(conversation_id);
        timeline.begin_load();
        timeline.apply_page(Vec::new());
        *client.inner.timeline.write().await = Some(timeline);
    }

    /// Install a timeline whose first fetch is still in flight.
    async fn open_loading(client: &ChatClient, conversation_id: Uuid) {
        let mut timeline = Timeline::new(conversation_id);
        timeline.begin_load();
        *client.inner.timeline.write().await = Some(timeline);
    }

    fn message_in(conversation_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            content: "hello".to_string(),
            reactions: vec![],
            created_at: Utc::now(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn send_message_rejects_blank_content() {
        let (client, mut commands) = test_client();
        open_empty(&client, Uuid::new_v4()).await;

        assert!(matches!(
            client.send_message("   \n\t ").await,
            Err(Error::EmptyMessage)
        ));
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_message_requires_an_open_conversation() {
        let (client, _commands) = test_client();
        assert!(matches!(
            client.send_message("hi").await,
            Err(Error::NoOpenConversation)
        ));
    }

    #[tokio::test]
    async fn send_message_trims_and_ends_the_typing_episode() {
        let (client, mut commands) = test_client();
        let conversation_id = Uuid::new_v4();
        open_empty(&client, conversation_id).await;

        client.send_message("  hi there  ").await.unwrap();

        match commands.recv().await {
            Some(ClientCommand::SendMessage {
                conversation_id: sent_to,
                content,
            }) => {
                assert_eq!(sent_to, conversation_id);
                assert_eq!(content, "hi there");
            }
            other => panic!("expected SendMessage, got {:?}", other),
        }
        assert!(matches!(
            commands.recv().await,
            Some(ClientCommand::Typing { is_typing: false, .. })
        ));
    }

    #[tokio::test]
    async fn every_keystroke_announces_typing_again() {
        let (client, mut commands) = test_client();
        open_empty(&client, Uuid::new_v4()).await;

        client.notify_typing().await.unwrap();
        client.notify_typing().await.unwrap();
        client.notify_typing().await.unwrap();

        // Receivers expire indicators on a TTL, so each keystroke must
        // renew the announcement.
        for _ in 0..3 {
            assert!(matches!(
                commands.try_recv(),
                Ok(ClientCommand::Typing { is_typing: true, .. })
            ));
        }
        // The debounced stop has not fired yet.
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_typing_sends_the_stop_immediately() {
        let (client, mut commands) = test_client();
        open_empty(&client, Uuid::new_v4()).await;

        client.notify_typing().await.unwrap();
        client.stop_typing().await.unwrap();

        assert!(matches!(
            commands.try_recv(),
            Ok(ClientCommand::Typing { is_typing: true, .. })
        ));
        assert!(matches!(
            commands.try_recv(),
            Ok(ClientCommand::Typing { is_typing: false, .. })
        ));

        // The next keystroke starts a fresh episode.
        client.notify_typing().await.unwrap();
        assert!(matches!(
            commands.try_recv(),
            Ok(ClientCommand::Typing { is_typing: true, .. })
        ));
    }

    #[tokio::test]
    async fn incoming_message_lands_in_the_open_timeline() {
        let (client, _commands) = test_client();
        let conversation_id = Uuid::new_v4();
        open_empty(&client, conversation_id).await;

        client
            .inner
            .session
            .inject(SessionEvent::Event(ServerEvent::ReceiveMessage(
                message_in(conversation_id),
            )));
        settle().await;

        let snapshot = client.timeline().await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
    }

    #[tokio::test]
    async fn message_for_another_conversation_is_dropped() {
        let (client, _commands) = test_client();
        open_empty(&client, Uuid::new_v4()).await;

        client
            .inner
            .session
            .inject(SessionEvent::Event(ServerEvent::ReceiveMessage(
                message_in(Uuid::new_v4()),
            )));
        settle().await;

        let snapshot = client.timeline().await.unwrap();
        assert!(snapshot.messages.is_empty());
    }

    #[tokio::test]
    async fn own_typing_events_are_ignored() {
        let (client, _commands) = test_client();
        let conversation_id = Uuid::new_v4();
        open_empty(&client, conversation_id).await;

        client
            .inner
            .session
            .inject(SessionEvent::Event(ServerEvent::Typing {
                conversation_id,
                user_id: client.local_user(),
                is_typing: true,
            }));
        settle().await;

        let snapshot = client.timeline().await.unwrap();
        assert!(snapshot.typing_users.is_empty());
    }

    #[tokio::test]
    async fn peer_typing_shows_in_the_snapshot() {
        let (client, _commands) = test_client();
        let conversation_id = Uuid::new_v4();
        let peer = Uuid::new_v4();
        open_empty(&client, conversation_id).await;

        client
            .inner
            .session
            .inject(SessionEvent::Event(ServerEvent::Typing {
                conversation_id,
                user_id: peer,
                is_typing: true,
            }));
        settle().await;

        let snapshot = client.timeline().await.unwrap();
        assert_eq!(snapshot.typing_users, vec![peer]);
    }

    #[tokio::test]
    async fn reaction_update_reaches_the_loaded_message() {
        let (client, _commands) = test_client();
        let conversation_id = Uuid::new_v4();
        open_empty(&client, conversation_id).await;

        let message = message_in(conversation_id);
        let message_id = message.id;
        client
            .inner
            .session
            .inject(SessionEvent::Event(ServerEvent::ReceiveMessage(message)));
        settle().await;

        let reactor = Uuid::new_v4();
        client
            .inner
            .session
            .inject(SessionEvent::Event(ServerEvent::ReactionUpdate {
                message_id,
                reactions: vec![Reaction {
                    user_id: reactor,
                    kind: ReactionKind::Haha,
                }],
            }));
        settle().await;

        let snapshot = client.timeline().await.unwrap();
        assert_eq!(snapshot.messages[0].reactions.len(), 1);
        assert_eq!(snapshot.messages[0].reactions[0].user_id, reactor);
    }

    #[tokio::test]
    async fn close_conversation_drops_the_timeline() {
        let (client, _commands) = test_client();
        open_empty(&client, Uuid::new_v4()).await;
        assert!(client.timeline().await.is_some());

        client.close_conversation().await;
        assert!(client.timeline().await.is_none());
    }

    #[tokio::test]
    async fn page_for_a_different_conversation_is_discarded() {
        let (client, _commands) = test_client();
        let open = Uuid::new_v4();
        open_empty(&client, open).await;

        let stale = Uuid::new_v4();
        client
            .apply_fetched_page(stale, vec![message_in(stale)])
            .await;

        let snapshot = client.timeline().await.unwrap();
        assert_eq!(snapshot.conversation_id, open);
        assert!(snapshot.messages.is_empty());
    }

    #[tokio::test]
    async fn page_resolving_after_a_switch_is_discarded() {
        let (client, _commands) = test_client();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        // The first conversation's fetch is still in flight when the user
        // switches away; it resolves against the new timeline.
        open_loading(&client, first).await;
        open_empty(&client, second).await;

        client
            .apply_fetched_page(first, vec![message_in(first)])
            .await;

        let snapshot = client.timeline().await.unwrap();
        assert_eq!(snapshot.conversation_id, second);
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.load_state, LoadState::Ready);
    }

    #[tokio::test]
    async fn abort_fetch_ignores_a_non_matching_conversation() {
        let (client, _commands) = test_client();
        let open = Uuid::new_v4();
        open_loading(&client, open).await;

        client.abort_fetch(Uuid::new_v4()).await;
        assert_eq!(
            client.timeline().await.unwrap().load_state,
            LoadState::Loading
        );

        client.abort_fetch(open).await;
        assert_eq!(
            client.timeline().await.unwrap().load_state,
            LoadState::Empty
        );
    }
}
