use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{info, warn};

use wren_types::events::{ClientCommand, ServerEvent};

use crate::error::{Error, Result};

/// Subscribers that fall further behind than this start losing events
/// and see a Lagged notice instead.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What a session subscriber sees: decoded server events, then a single
/// `Closed` once the connection is gone.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Event(ServerEvent),
    Closed,
}

/// An owned handle to one realtime connection.
///
/// There is no shared global connection and no automatic reconnect:
/// dropping the handle tears the connection down, and a caller that wants
/// back in opens a fresh session and refetches history over REST.
pub struct ChatSession {
    out_tx: mpsc::UnboundedSender<ClientCommand>,
    events_tx: broadcast::Sender<SessionEvent>,
    send_task: Option<JoinHandle<()>>,
    recv_task: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Open a WebSocket session against `gateway_url`, presenting the
    /// bearer token on the upgrade request.
    pub async fn connect(gateway_url: &str, token: &str) -> Result<Self> {
        let mut request = gateway_url.into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::Config("token is not a valid header value".to_string()))?;
        request.headers_mut().insert("Authorization", bearer);

        let (stream, _) = connect_async(request).await?;
        let (mut sink, mut stream) = stream.split();

        info!("Connected to gateway at {}", gateway_url);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientCommand>();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let send_task = tokio::spawn(async move {
            while let Some(command) = out_rx.recv().await {
                let text = serde_json::to_string(&command).unwrap();
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        let events = events_tx.clone();
        let recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = stream.next().await {
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            let _ = events.send(SessionEvent::Event(event));
                        }
                        Err(e) => {
                            let preview: String = text.chars().take(200).collect();
                            warn!("Bad server event: {} -- raw: {}", e, preview);
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            info!("Gateway connection closed");
            let _ = events.send(SessionEvent::Closed);
        });

        Ok(Self {
            out_tx,
            events_tx,
            send_task: Some(send_task),
            recv_task: Some(recv_task),
        })
    }

    /// Queue a command for the gateway.
    pub fn emit(&self, command: ClientCommand) -> Result<()> {
        self.out_tx.send(command).map_err(|_| Error::ChannelClosed)
    }

    /// Subscribe to session events. Each receiver sees every event from
    /// the point of subscription onward.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Close the session. Equivalent to dropping the handle.
    pub fn disconnect(self) {}

    /// A session with no transport behind it, for exercising the client
    /// without a server. Returns the receiving end of the command channel.
    #[cfg(test)]
    pub(crate) fn in_memory() -> (Self, mpsc::UnboundedReceiver<ClientCommand>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                out_tx,
                events_tx,
                send_task: None,
                recv_task: None,
            },
            out_rx,
        )
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn emit_queues_commands_in_order() {
        let (session, mut commands) = ChatSession::in_memory();
        let conversation_id = Uuid::new_v4();

        session
            .emit(ClientCommand::Typing {
                conversation_id,
                is_typing: true,
            })
            .unwrap();
        session
            .emit(ClientCommand::SendMessage {
                conversation_id,
                content: "hello".to_string(),
            })
            .unwrap();

        assert!(matches!(
            commands.recv().await,
            Some(ClientCommand::Typing { is_typing: true, .. })
        ));
        assert!(matches!(
            commands.recv().await,
            Some(ClientCommand::SendMessage { .. })
        ));
    }

    #[tokio::test]
    async fn subscribers_see_injected_events() {
        let (session, _commands) = ChatSession::in_memory();
        let mut rx = session.subscribe();

        session.inject(SessionEvent::Closed);

        assert!(matches!(rx.recv().await, Ok(SessionEvent::Closed)));
    }

    #[tokio::test]
    async fn emit_after_receiver_dropped_is_channel_closed() {
        let (session, commands) = ChatSession::in_memory();
        drop(commands);

        let result = session.emit(ClientCommand::Typing {
            conversation_id: Uuid::new_v4(),
            is_typing: false,
        });
        assert!(matches!(result, Err(Error::ChannelClosed)));
    }
}
