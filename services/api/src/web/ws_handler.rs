//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a document viewer's
//! WebSocket connection. It opens viewing sessions and hands them to the
//! viewing task.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::{ActiveViewing, AppState, CustomerId, ViewerState},
    viewing_task::{viewing_process, ViewerCommand},
};
use ambassador_core::{AccrualError, DocumentDescriptor};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(CustomerId(customer_id)): Extension<CustomerId>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, customer_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, customer_id: String) {
    info!("New viewer connection for customer: {}", customer_id);

    // The sender is wrapped in an Arc<Mutex<>> to allow for shared mutable access across tasks.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));
    let mut viewer = ViewerState::new(customer_id);

    // --- Main Message Loop ---
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(text.as_str(), &app_state, &mut viewer, &ws_sender).await;
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket error: {}", e);
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    // --- Cleanup ---
    // A disconnect counts as closing the viewer, so earned credit is still submitted.
    if let Some(active) = viewer.active.take() {
        if active.commands.send(ViewerCommand::Close).await.is_err() {
            info!("Viewing session {} had already ended.", active.session_id);
        }
    }
    info!("Viewer connection closed.");
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    viewer: &mut ViewerState,
    ws_sender: &WsSender,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            send_message(
                ws_sender,
                &ServerMessage::Error {
                    message: "Malformed message.".to_string(),
                },
            )
            .await;
            return;
        }
    };

    viewer.reap_finished();

    match client_msg {
        ClientMessage::Open {
            document_id,
            base_points,
        } => {
            if let Some(active) = &viewer.active {
                warn!(
                    "Open for {} ignored: document {} is still open.",
                    document_id, active.document_id
                );
                send_message(
                    ws_sender,
                    &ServerMessage::Error {
                        message: "Another document is already open.".to_string(),
                    },
                )
                .await;
                return;
            }

            let document = DocumentDescriptor {
                document_id,
                base_points,
            };
            match app_state.engine.open(&viewer.customer_id, document).await {
                Ok(session) => {
                    let (commands_tx, commands_rx) = mpsc::channel(8);
                    let (outbound_tx, outbound_rx) = mpsc::channel(64);
                    let session_id = session.id();
                    let document_id = session.document().document_id.clone();

                    tokio::spawn(forward_outbound(outbound_rx, ws_sender.clone()));
                    let task = tokio::spawn(viewing_process(
                        app_state.engine.clone(),
                        session,
                        commands_rx,
                        outbound_tx,
                    ));

                    viewer.active = Some(ActiveViewing {
                        session_id,
                        document_id,
                        commands: commands_tx,
                        task,
                    });
                }
                Err(AccrualError::CooldownActive {
                    document_id,
                    remaining_seconds,
                }) => {
                    info!(
                        "Document {} is in cooldown for {}s.",
                        document_id, remaining_seconds
                    );
                    send_message(
                        ws_sender,
                        &ServerMessage::CooldownActive {
                            document_id,
                            remaining_seconds,
                        },
                    )
                    .await;
                }
                Err(e @ AccrualError::SubmissionPending { .. }) => {
                    warn!("Open refused: {}", e);
                    send_message(
                        ws_sender,
                        &ServerMessage::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
                }
                Err(e) => {
                    error!("Failed to open viewing session: {}", e);
                    send_message(
                        ws_sender,
                        &ServerMessage::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
                }
            }
        }
        ClientMessage::Close => match viewer.active.take() {
            Some(active) => {
                info!("Close received for viewing session {}.", active.session_id);
                if active.commands.send(ViewerCommand::Close).await.is_err() {
                    warn!("Viewing session {} had already ended.", active.session_id);
                }
            }
            None => {
                warn!("Close received with no open document, which is ignored.");
            }
        },
    }
}

/// Writes the viewing task's messages to the socket until the task finishes.
async fn forward_outbound(mut outbound: mpsc::Receiver<ServerMessage>, ws_sender: WsSender) {
    while let Some(message) = outbound.recv().await {
        if !send_message(&ws_sender, &message).await {
            break;
        }
    }
}

async fn send_message(ws_sender: &WsSender, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return false;
        }
    };
    if ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await
        .is_err()
    {
        warn!("Failed to send message to viewer. Client may have disconnected.");
        return false;
    }
    true
}
