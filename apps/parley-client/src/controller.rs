//! Client-side session controller.
//!
//! Owns the socket for its whole lifecycle: connect, present the stored
//! credential, surface server frames as events, accept sends while live,
//! and retry with a fixed delay after an unexpected drop. A rejected
//! credential or an explicit logout clears the token and ends the
//! controller for good.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use parley_common::{ChatMessage, ClientFrame, ServerFrame};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = SplitSink<WsStream, tungstenite::Message>;

/// Where the controller currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Authenticating,
    Live,
}

/// Instructions accepted by a running controller.
#[derive(Debug)]
enum Command {
    Send(String),
    Logout,
}

/// Everything a frontend needs to render the session.
#[derive(Debug, Clone)]
pub enum Event {
    /// A connection attempt is starting (1-based counter).
    Connecting { attempt: u32 },
    /// The handshake finished; sends are accepted from now on.
    Live,
    /// History replay delivered on admission, oldest first.
    History(Vec<ChatMessage>),
    /// A chat message fanned out by the server, own messages included.
    Chat(ChatMessage),
    /// A server-generated notice.
    System { content: String },
    /// Current number of connected sessions.
    Presence { count: usize },
    /// The server could not process a send; the session is still live.
    ServerError { message: String },
    /// A send was dropped before reaching the server.
    SendFailed { reason: String },
    /// The credential was rejected. The stored token is discarded and the
    /// controller stops; the user must log in again.
    AuthRejected { message: String },
    /// The socket dropped outside a logout.
    ConnectionLost,
    /// Sleeping before the next connection attempt.
    Reconnecting { delay: Duration },
    /// Logout completed; the controller is done.
    LoggedOut,
}

/// Settings for a controller run.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Gateway endpoint, e.g. `ws://localhost:3000/ws`.
    pub ws_url: String,
    /// Fixed pause between reconnect attempts.
    pub reconnect_delay: Duration,
}

struct Shared {
    config: ControllerConfig,
    token: Mutex<Option<String>>,
    phase: Mutex<Phase>,
    events: mpsc::UnboundedSender<Event>,
}

impl Shared {
    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    fn clear_token(&self) {
        *self.token.lock() = None;
    }
}

/// Handle held by the frontend. Feed it sends, read the phase, or log
/// out; events stream out of the receiver returned by [`spawn`].
///
/// [`spawn`]: SessionController::spawn
pub struct SessionController {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl SessionController {
    /// Start a controller for a logged-in user.
    pub fn spawn(
        config: ControllerConfig,
        token: String,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            config,
            token: Mutex::new(Some(token)),
            phase: Mutex::new(Phase::Disconnected),
            events: event_tx,
        });

        let task = tokio::spawn(run(shared.clone(), command_rx));

        (
            Self {
                commands: command_tx,
                shared,
                task,
            },
            event_rx,
        )
    }

    /// Queue a chat send. Delivered only while live; otherwise the
    /// controller answers with a `SendFailed` event.
    pub fn send(&self, content: impl Into<String>) {
        let _ = self.commands.send(Command::Send(content.into()));
    }

    /// Close the socket, clear the stored credential, stop reconnecting.
    pub fn logout(&self) {
        let _ = self.commands.send(Command::Logout);
    }

    pub fn phase(&self) -> Phase {
        *self.shared.phase.lock()
    }

    /// Wait for the controller task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// How one connection attempt ended.
enum RunEnd {
    /// The user asked to stop.
    Logout,
    /// The server refused the credential.
    Rejected(String),
    /// The socket went away or never came up.
    Dropped { was_live: bool },
}

async fn run(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut attempt: u32 = 0;

    loop {
        // No credential means a logout or rejection already happened.
        let token = match shared.token.lock().clone() {
            Some(token) => token,
            None => return,
        };

        attempt += 1;
        shared.set_phase(Phase::Connecting);
        shared.emit(Event::Connecting { attempt });

        let end = connect_once(&shared, &token, &mut commands).await;
        shared.set_phase(Phase::Disconnected);

        match end {
            RunEnd::Logout => {
                shared.clear_token();
                shared.emit(Event::LoggedOut);
                return;
            }
            RunEnd::Rejected(message) => {
                // A refused credential will not get better by retrying.
                shared.clear_token();
                shared.emit(Event::AuthRejected { message });
                return;
            }
            RunEnd::Dropped { was_live } => {
                if was_live {
                    shared.emit(Event::ConnectionLost);
                }
            }
        }

        // Fixed-delay retry, cancellable only by logout.
        let delay = shared.config.reconnect_delay;
        shared.emit(Event::Reconnecting { delay });
        tokio::select! {
            _ = time::sleep(delay) => {}
            logged_out = drain_until_logout(&shared, &mut commands) => {
                if logged_out {
                    shared.clear_token();
                    shared.emit(Event::LoggedOut);
                }
                // Either way the controller is done: a closed command
                // channel means the handle itself is gone.
                return;
            }
        }
    }
}

/// While waiting out the reconnect delay, fail queued sends and watch for
/// logout. Returns `true` on logout, `false` if the handle disappeared.
async fn drain_until_logout(
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> bool {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Logout => return true,
            Command::Send(_) => shared.emit(Event::SendFailed {
                reason: "not connected".to_string(),
            }),
        }
    }
    false
}

/// Dial, authenticate, and pump frames until the attempt ends.
async fn connect_once(
    shared: &Shared,
    token: &str,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> RunEnd {
    let ws = match connect_async(&shared.config.ws_url).await {
        Ok((ws, _)) => ws,
        Err(err) => {
            tracing::debug!(%err, "connect failed");
            return RunEnd::Dropped { was_live: false };
        }
    };
    let (mut ws_tx, mut ws_rx) = ws.split();

    // The credential is always the first frame on the wire.
    shared.set_phase(Phase::Authenticating);
    let auth = ClientFrame::Auth {
        token: token.to_string(),
    };
    if send_frame(&mut ws_tx, &auth).await.is_err() {
        return RunEnd::Dropped { was_live: false };
    }

    let mut live = false;

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(frame) => {
                                if let Some(end) = apply_frame(shared, frame, &mut live) {
                                    return end;
                                }
                            }
                            Err(err) => {
                                tracing::debug!(%err, "ignoring unparseable frame");
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_))) => {
                        continue;
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        return RunEnd::Dropped { was_live: live };
                    }
                    Some(Err(err)) => {
                        tracing::debug!(%err, "ws read error");
                        return RunEnd::Dropped { was_live: live };
                    }
                    Some(Ok(_)) => continue,
                }
            }

            command = commands.recv() => {
                match command {
                    Some(Command::Send(content)) => {
                        if !live {
                            shared.emit(Event::SendFailed {
                                reason: "not connected".to_string(),
                            });
                            continue;
                        }
                        let content = content.trim().to_string();
                        if content.is_empty() {
                            continue;
                        }
                        let frame = ClientFrame::Chat { content };
                        if send_frame(&mut ws_tx, &frame).await.is_err() {
                            // At-most-once: the message is gone, nothing
                            // is queued for the next connection.
                            return RunEnd::Dropped { was_live: live };
                        }
                    }
                    Some(Command::Logout) | None => {
                        let _ = ws_tx.close().await;
                        return RunEnd::Logout;
                    }
                }
            }
        }
    }
}

/// Apply one server frame to the session. Returns `Some` when the frame
/// ends this connection attempt.
fn apply_frame(shared: &Shared, frame: ServerFrame, live: &mut bool) -> Option<RunEnd> {
    match frame {
        ServerFrame::History { messages } => {
            shared.emit(Event::History(messages));
            if !*live {
                // The history replay is the admission signal.
                *live = true;
                shared.set_phase(Phase::Live);
                shared.emit(Event::Live);
            }
            None
        }
        ServerFrame::Chat { message } => {
            shared.emit(Event::Chat(message));
            None
        }
        ServerFrame::System { content, .. } => {
            shared.emit(Event::System { content });
            None
        }
        ServerFrame::UserCount { count } => {
            shared.emit(Event::Presence { count });
            None
        }
        ServerFrame::Error { message } => {
            if *live {
                // A processing failure for one send; the session goes on.
                shared.emit(Event::ServerError { message });
                None
            } else {
                // Pre-admission errors are handshake rejections.
                Some(RunEnd::Rejected(message))
            }
        }
    }
}

async fn send_frame(ws_tx: &mut WsSink, frame: &ClientFrame) -> Result<(), tungstenite::Error> {
    // Our own frame types always serialize.
    let json = serde_json::to_string(frame).unwrap();
    ws_tx.send(tungstenite::Message::Text(json.into())).await
}
