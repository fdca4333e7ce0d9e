use reqwest::Client;
use uuid::Uuid;

use wren_types::api::{
    AddParticipantsRequest, AddParticipantsResponse, ApiError, CreateConversationRequest,
    CreateConversationResponse, FriendRequestAction, FriendRequestCreate, FriendRequestEntry,
    FriendRequestRespond, MESSAGE_PAGE_SIZE, UpdateProfileRequest,
};
use wren_types::models::{Conversation, Friendship, Message, User};

use crate::error::{Error, Result};

/// Thin wrapper over the REST boundary. All calls carry the bearer token
/// and decode the server's error body on non-2xx statuses.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// The authenticated user's own profile.
    pub async fn me(&self) -> Result<User> {
        let resp = self
            .execute(self.http.get(format!("{}/users/me", self.base_url)))
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn update_profile(&self, update: &UpdateProfileRequest) -> Result<User> {
        let resp = self
            .execute(
                self.http
                    .patch(format!("{}/users/me", self.base_url))
                    .json(update),
            )
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let resp = self
            .execute(
                self.http
                    .get(format!("{}/users/search", self.base_url))
                    .query(&[("q", query)]),
            )
            .await?;
        Ok(resp.json().await?)
    }

    /// One page of history, newest first. `cursor` is the id of the oldest
    /// already-loaded message; `None` fetches the newest page.
    pub async fn fetch_messages(
        &self,
        conversation_id: Uuid,
        cursor: Option<Uuid>,
    ) -> Result<Vec<Message>> {
        let mut request = self
            .http
            .get(format!(
                "{}/conversations/{}/messages",
                self.base_url, conversation_id
            ))
            .query(&[("limit", MESSAGE_PAGE_SIZE.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor.to_string())]);
        }

        let resp = self.execute(request).await?;
        Ok(resp.json().await?)
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let resp = self
            .execute(self.http.get(format!("{}/conversations", self.base_url)))
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<CreateConversationResponse> {
        let resp = self
            .execute(
                self.http
                    .post(format!("{}/conversations", self.base_url))
                    .json(request),
            )
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn add_participants(
        &self,
        conversation_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<AddParticipantsResponse> {
        let resp = self
            .execute(
                self.http
                    .post(format!(
                        "{}/conversations/{}/participants",
                        self.base_url, conversation_id
                    ))
                    .json(&AddParticipantsRequest {
                        user_ids: user_ids.to_vec(),
                    }),
            )
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        self.execute(self.http.delete(format!(
            "{}/conversations/{}/participants/{}",
            self.base_url, conversation_id, user_id
        )))
        .await?;
        Ok(())
    }

    pub async fn list_friends(&self) -> Result<Vec<User>> {
        let resp = self
            .execute(self.http.get(format!("{}/friends", self.base_url)))
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn pending_friend_requests(&self) -> Result<Vec<FriendRequestEntry>> {
        let resp = self
            .execute(
                self.http
                    .get(format!("{}/friends/requests/pending", self.base_url)),
            )
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn sent_friend_requests(&self) -> Result<Vec<FriendRequestEntry>> {
        let resp = self
            .execute(
                self.http
                    .get(format!("{}/friends/requests/sent", self.base_url)),
            )
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn send_friend_request(&self, addressee_id: Uuid) -> Result<Friendship> {
        let resp = self
            .execute(
                self.http
                    .post(format!("{}/friends/requests", self.base_url))
                    .json(&FriendRequestCreate { addressee_id }),
            )
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn respond_friend_request(
        &self,
        request_id: Uuid,
        action: FriendRequestAction,
    ) -> Result<Friendship> {
        let resp = self
            .execute(
                self.http
                    .post(format!(
                        "{}/friends/requests/{}/respond",
                        self.base_url, request_id
                    ))
                    .json(&FriendRequestRespond { action }),
            )
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn unfriend(&self, user_id: Uuid) -> Result<()> {
        self.execute(
            self.http
                .delete(format!("{}/friends/{}", self.base_url, user_id)),
        )
        .await?;
        Ok(())
    }

    /// Attach the bearer token, send, and map non-2xx statuses to
    /// `Error::Api` with the decoded error body.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = request
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(Error::Api { status, message });
        }

        Ok(resp)
    }
}
