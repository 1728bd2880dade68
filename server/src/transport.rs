//! WebSocket and HTTP front end of the [`Hub`].
//!
//! | Path | Peer |
//! |------|------|
//! | `/controller` | control surfaces |
//! | `/recorder` | the recording client, one at a time |
//! | `/audio` | raw audio stream of the recorder |
//! | `/`, `/player` | players |
//! | `/audiofiles/{file}` | latest WAV of a segment slot |

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::HubError;
use crate::hub::Hub;
use crate::store::parse_segment_file_name;

#[derive(Clone)]
struct AppState {
    hub: Arc<Hub>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Controller,
    Recorder,
    Audio,
    Player,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Controller => "controller",
            Role::Recorder => "recorder",
            Role::Audio => "audio",
            Role::Player => "player",
        };
        f.write_str(name)
    }
}

pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/", get(handle_player))
        .route("/player", get(handle_player))
        .route("/controller", get(handle_controller))
        .route("/recorder", get(handle_recorder))
        .route("/audio", get(handle_audio))
        .route("/audiofiles/{file}", get(handle_segment_file))
        .with_state(AppState { hub })
}

/// Serves the hub until the listener fails.
pub async fn run(hub: Arc<Hub>, addr: SocketAddr) -> Result<(), HubError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(hub)).await?;
    Ok(())
}

async fn handle_controller(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, Role::Controller))
}

async fn handle_recorder(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, Role::Recorder))
}

async fn handle_audio(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, Role::Audio))
}

async fn handle_player(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, Role::Player))
}

async fn handle_segment_file(
    Path(file): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let Some(slot) = parse_segment_file_name(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.hub.segment(slot).await {
        Some(wav) => ([(header::CONTENT_TYPE, "audio/wav")], wav).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, role: Role) {
    let id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = inbox.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let accepted = match role {
        Role::Controller => {
            hub.connect_controller(id, outbox.clone()).await;
            true
        }
        Role::Recorder => hub.connect_recorder(id, &outbox).await.is_ok(),
        Role::Audio => true,
        Role::Player => {
            hub.connect_player(id, outbox.clone()).await;
            true
        }
    };

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) if text.as_str().is_empty() => {
                let _ = outbox.send(String::new());
            }
            Message::Binary(data) if data.is_empty() => {
                let _ = outbox.send(String::new());
            }
            Message::Text(text) if accepted => {
                let result = match role {
                    Role::Controller => hub.controller_message(&id, text.as_str()).await,
                    Role::Recorder => hub.recorder_message(&id, text.as_str()).await,
                    Role::Player => hub.player_message(&id, text.as_str()).await,
                    Role::Audio => Ok(()),
                };
                if let Err(e) = result {
                    warn!("{role} {id}: dropping message: {e}");
                }
            }
            Message::Binary(data) if role == Role::Audio => {
                let published = hub.audio_frame(&data).await;
                if published > 0 {
                    debug!("{role} {id}: {published} segments published");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    match role {
        Role::Controller => hub.disconnect_controller(&id).await,
        Role::Recorder => hub.disconnect_recorder(&id).await,
        Role::Player => hub.disconnect_player(&id).await,
        Role::Audio => {}
    }
    debug!("{role} {id} closed");
    drop(outbox);
    writer.abort();
}
