use crate::db::{Message, Storage};
use crate::error::VetdeskError;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

const DERIVED_TITLE_CHARS: usize = 48;

/// Events pushed to live subscribers, serialized as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum BusEvent {
    NewMessage(Message),
}

/// Body of `POST /send`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessage {
    /// Existing thread to append to; a new thread is opened when absent.
    pub thread_id: Option<i64>,
    pub title: Option<String>,
    pub sender: String,
    pub body: String,
}

impl SendMessage {
    fn thread_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.body.trim().chars().take(DERIVED_TITLE_CHARS).collect(),
        }
    }
}

#[derive(Debug)]
pub enum MessageBusMessage {
    /// Persist a message, then broadcast it.
    Send(SendMessage, RpcReplyPort<Result<Message, VetdeskError>>),
}

/// Handle for interacting with the message bus actor.
#[derive(Clone)]
pub struct MessageBusHandle {
    actor: ActorRef<MessageBusMessage>,
    events: broadcast::Sender<BusEvent>,
}

impl MessageBusHandle {
    pub async fn send(&self, message: SendMessage) -> Result<Message, VetdeskError> {
        ractor::call!(self.actor, MessageBusMessage::Send, message)
            .map_err(|e| VetdeskError::RactorError(format!("Send RPC failed: {e}")))?
    }

    /// Receive every event broadcast after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }
}

struct MessageBusState {
    storage: Storage,
    events: broadcast::Sender<BusEvent>,
}

/// Single writer for the relay. Messages are handled one at a time, so
/// subscribers observe events in insertion order.
struct MessageBus;

#[ractor::async_trait]
impl Actor for MessageBus {
    type Msg = MessageBusMessage;
    type State = MessageBusState;
    type Arguments = (Storage, broadcast::Sender<BusEvent>);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (storage, events) = args;
        info!("MessageBus started");
        Ok(MessageBusState { storage, events })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            MessageBusMessage::Send(outgoing, reply_port) => {
                let result = self.handle_send(state, outgoing).await;
                let _ = reply_port.send(result);
            }
        }
        Ok(())
    }
}

impl MessageBus {
    async fn handle_send(
        &self,
        state: &mut MessageBusState,
        outgoing: SendMessage,
    ) -> Result<Message, VetdeskError> {
        if outgoing.sender.trim().is_empty() || outgoing.body.trim().is_empty() {
            return Err(VetdeskError::validation("sender and body are required"));
        }

        let thread_id = match outgoing.thread_id {
            Some(id) => id,
            None => {
                let thread = state.storage.create_thread(&outgoing.thread_title()).await?;
                debug!(thread_id = thread.id, "thread opened");
                thread.id
            }
        };
        let stored = state
            .storage
            .create_message(thread_id, &outgoing.sender, &outgoing.body)
            .await?;

        // Err only means nobody is listening.
        let delivered = state
            .events
            .send(BusEvent::NewMessage(stored.clone()))
            .unwrap_or(0);
        debug!(
            thread_id,
            message_id = stored.id,
            delivered,
            "new_message broadcast"
        );
        Ok(stored)
    }
}

/// Spawn the message bus actor and return a handle.
pub async fn spawn(
    storage: Storage,
    channel_capacity: usize,
) -> Result<MessageBusHandle, VetdeskError> {
    let (events, _) = broadcast::channel(channel_capacity.max(1));
    let (actor, _jh) = Actor::spawn(None, MessageBus, (storage, events.clone()))
        .await
        .map_err(|e| VetdeskError::RactorError(format!("spawn MessageBus failed: {e}")))?;
    Ok(MessageBusHandle { actor, events })
}
