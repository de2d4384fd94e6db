use crate::db::{Message, ThreadSummary};
use crate::middleware::auth::RequireKeyAuth;
use crate::router::AppState;
use crate::service::{BusEvent, SendMessage};
use crate::VetdeskError;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /threads -> every thread with its message count and latest message.
pub async fn list_threads(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<ThreadSummary>>, VetdeskError> {
    Ok(Json(state.storage.list_thread_summaries().await?))
}

/// GET /threads/{id}/messages?limit=N
pub async fn list_thread_messages(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, VetdeskError> {
    let limit = query.limit.unwrap_or(state.history_limit);
    Ok(Json(state.storage.list_messages(thread_id, limit).await?))
}

/// POST /send -> persist and fan out to every connected socket.
pub async fn send_message(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Json(outgoing): Json<SendMessage>,
) -> Result<(StatusCode, Json<Message>), VetdeskError> {
    if state.send_limiter.check().is_err() {
        return Err(VetdeskError::RateLimited);
    }
    let message = state.bus.send(outgoing).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /socket -> WebSocket that receives `new_message` events.
pub async fn socket_handler(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    // Subscribe before the upgrade completes so nothing sent in between is lost.
    let events = state.bus.subscribe();
    ws.on_upgrade(move |socket| relay_events(socket, events))
}

async fn relay_events(socket: WebSocket, events: broadcast::Receiver<BusEvent>) {
    info!("socket connected");
    let (mut sink, mut inbound) = socket.split();
    let mut events = BroadcastStream::new(events);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "dropping unserializable event");
                            continue;
                        }
                    };
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "socket lagged behind the bus");
                }
                None => break,
            },
            frame = inbound.next() => match frame {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("socket disconnected");
}
