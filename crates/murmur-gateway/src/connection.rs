use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use murmur_db::{Database, StoreError};
use murmur_types::api::SendMessageRequest;
use murmur_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;
use crate::presence::SessionHandle;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Server-side state of one authenticated realtime connection.
pub struct Session {
    user_id: Uuid,
    username: String,
    handle: SessionHandle,
    joined: AtomicBool,
    dispatcher: Dispatcher,
    db: Arc<Database>,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        username: String,
        handle: SessionHandle,
        dispatcher: Dispatcher,
        db: Arc<Database>,
    ) -> Self {
        Self {
            user_id,
            username,
            handle,
            joined: AtomicBool::new(false),
            dispatcher,
            db,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub async fn handle_command(&self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Join { user_id } => self.join(user_id).await,
            GatewayCommand::SendMessage(req) => self.send_message(req).await,
        }
    }

    async fn join(&self, claimed: Uuid) {
        if claimed != self.user_id {
            warn!(
                "{} ({}) tried to join as {}, ignoring",
                self.username, self.user_id, claimed
            );
            return;
        }
        if self
            .dispatcher
            .presence()
            .register(self.user_id, self.handle.clone())
            .await
        {
            info!("{} ({}) joined [session={}]", self.username, self.user_id, self.handle.id());
        }
        self.joined.store(true, Ordering::Release);
    }

    /// Persist first, then fan out. A failed push never undoes the write.
    async fn send_message(&self, req: SendMessageRequest) {
        let new = match req.validate() {
            Ok(new) => new,
            Err(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                warn!("{} ({}) send_message rejected: {:?}", self.username, self.user_id, fields);
                self.reject(format!("missing or invalid fields: {}", fields.join(", ")));
                return;
            }
        };

        let from = self.user_id;
        match self.db.blocking(move |db| db.create_message(from, &new)).await {
            Ok(message) => {
                self.dispatcher.message_created(&message).await;
            }
            Err(e) => {
                match &e {
                    StoreError::InvalidArgument { .. }
                    | StoreError::NotFound(_)
                    | StoreError::Forbidden(_) => {
                        warn!("{} ({}) send_message rejected: {}", self.username, self.user_id, e)
                    }
                    _ => error!("{} ({}) send_message failed: {}", self.username, self.user_id, e),
                }
                self.reject(client_message(&e));
            }
        }
    }

    fn reject(&self, message: String) {
        self.handle.send(GatewayEvent::Error { message });
    }

    /// Remove this session from presence. Safe to call when never joined.
    pub async fn close(&self) {
        if self.joined.load(Ordering::Acquire) {
            self.dispatcher
                .presence()
                .unregister(self.user_id, self.handle.id())
                .await;
        }
    }
}

/// What a client is told about a failed command. Internal failures are not spelled out.
fn client_message(e: &StoreError) -> String {
    match e {
        StoreError::InvalidArgument { .. } | StoreError::NotFound(_) | StoreError::Forbidden(_) => {
            e.to_string()
        }
        _ => "internal error".to_string(),
    }
}

/// Handle a WebSocket whose bearer token was validated at the HTTP upgrade.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let (handle, mut session_rx) = SessionHandle::new();
    let session = Arc::new(Session::new(user_id, username.clone(), handle, dispatcher, db));

    // Set by the reader on every Pong
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = session_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => recv_session.handle_command(cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            recv_session.user_id(),
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    session.close().await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to encode {} event: {}", event.name(), e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
