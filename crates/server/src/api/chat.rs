//! # Chat Channel
//!
//! The message channel over a websocket. Each connection owns one
//! `PromptCorrelator`; every `query` message starts a run on it, and
//! `answer` messages are routed to the question they name.
//!
//! ```text
//! socket ─▶ reader ─┬─ query  ─▶ spawn run (JoinSet)
//!                   └─ answer ─▶ correlator.resolve ─▶ answer_ack
//! runs / acks ─▶ mpsc ─▶ writer task ─▶ socket
//! ```

use super::{AppState, SharedState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use shopwise_core::channel::{InboundMessage, MessageSink, OutboundMessage};
use shopwise_core::pipeline::{PipelineOrchestrator, PromptCorrelator};
use shopwise_core::skills::ChatCompletionsClient;
use shopwise_core::state::{RunRecord, ShopResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub async fn chat_websocket(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state))
}

async fn handle_chat_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(64);

    // Forward outbound messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("failed to encode {} message: {}", message.kind(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let correlator = Arc::new(PromptCorrelator::new(Arc::new(out_tx.clone())));
    let mut runs = JoinSet::new();
    tracing::info!("chat connection opened");

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<InboundMessage>(&text) {
            Ok(InboundMessage::Query { text }) => {
                let state = state.clone();
                let correlator = correlator.clone();
                runs.spawn(async move {
                    run_and_record(&state, correlator, &text).await;
                });
            }
            Ok(InboundMessage::Answer { id, text }) => {
                let accepted = correlator.resolve(&id, &text);
                if out_tx.send(OutboundMessage::answer_ack(&id, accepted)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = out_tx
                    .send(OutboundMessage::Error {
                        message: format!("Invalid message: {}", e),
                    })
                    .await;
            }
        }

        // Reap finished runs
        while runs.try_join_next().is_some() {}
    }

    runs.abort_all();
    let purged = correlator.purge();
    send_task.abort();
    tracing::info!(purged, "chat connection closed");
}

/// Run one query on the given channel and store the outcome in history
pub async fn run_and_record(
    state: &AppState,
    correlator: Arc<PromptCorrelator>,
    query: &str,
) -> Option<ShopResult> {
    let config = state.pipeline_config().await;
    let generator = match ChatCompletionsClient::from_env(config.model.clone()) {
        Ok(generator) => Arc::new(generator),
        Err(e) => {
            tracing::error!("cannot start run: {}", e);
            let _ = correlator
                .sink()
                .send(OutboundMessage::Error {
                    message: e.to_string(),
                })
                .await;
            return None;
        }
    };

    let id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let orchestrator = PipelineOrchestrator::new(config, generator, state.catalog.clone(), correlator);
    let outcome = orchestrator.run_and_report(query).await;

    let record = match &outcome {
        Ok(result) => RunRecord::completed(&id, query, started_at, result),
        Err(e) => RunRecord::failed(&id, query, started_at, e),
    };
    if let Err(e) = state.history.save(&record) {
        tracing::warn!(run = %id, "failed to store run: {:#}", e);
    }
    outcome.ok()
}
