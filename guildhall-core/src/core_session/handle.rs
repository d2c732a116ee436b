/*
   SessionHandle

   Single entry point for everything outside the presentation thread.
   Callers never touch `SessionManager` directly: each method packages a
   `SessionCommand`, pushes it onto the loop's channel and, where there is
   an answer, awaits it on a oneshot.

   Background work started by screens reports back on the same channel as
   `SessionCommand::Complete`, so all session state is only ever touched
   from the loop task.

    ┌───────────────────────────────┐
    │  CLI / tests / other tasks    │
    └──────────────┬────────────────┘
                   │ SessionHandle
    ┌──────────────▼────────────────┐        ┌──────────────────┐
    │         Session loop          │◄───────┤ spawned store I/O│
    │  (owns SessionManager)        │Complete└──────────────────┘
    └──────────────┬────────────────┘
                   │ SessionEvent
                   ▼
              event receiver
*/

use super::context::Completion;
use super::grid::{Click, Grid};
use super::input::{InputDispatch, InputPrompt};
use super::manager::{SessionManager, SessionSnapshot};
use super::pending::{ActionTarget, Armed, ConfirmError};
use super::screen::Screen;
use crate::config::SessionConfig;
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::PlayerId;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Commands processed by the session loop
pub enum SessionCommand {
    Open {
        player: PlayerId,
        screen: Box<dyn Screen>,
    },
    Close {
        player: PlayerId,
    },
    Refresh {
        player: PlayerId,
    },
    EnterInput {
        player: PlayerId,
        prompt: InputPrompt,
    },
    Input {
        player: PlayerId,
        text: String,
        response_tx: oneshot::Sender<InputDispatch>,
    },
    Click {
        player: PlayerId,
        click: Click,
    },
    Arm {
        player: PlayerId,
        target: ActionTarget,
        response_tx: oneshot::Sender<Armed>,
    },
    Confirm {
        player: PlayerId,
        target: ActionTarget,
        response_tx: oneshot::Sender<Result<ActionTarget, ConfirmError>>,
    },
    Cancel {
        player: PlayerId,
        response_tx: oneshot::Sender<Option<ActionTarget>>,
    },
    Notify {
        player: PlayerId,
        text: String,
    },
    Snapshot {
        player: PlayerId,
        response_tx: oneshot::Sender<SessionSnapshot>,
    },
    /// Deadline sweep for a pending action
    ExpirePending {
        player: PlayerId,
        seq: u64,
    },
    Complete(Completion),
    Disconnect {
        player: PlayerId,
    },
    Shutdown,
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::Open { player, screen } => {
                write!(f, "Open({}, {})", player, screen.title())
            }
            SessionCommand::Close { player } => write!(f, "Close({})", player),
            SessionCommand::Refresh { player } => write!(f, "Refresh({})", player),
            SessionCommand::EnterInput { player, prompt } => {
                write!(f, "EnterInput({}, {:?})", player, prompt.prompt)
            }
            SessionCommand::Input { player, .. } => write!(f, "Input({})", player),
            SessionCommand::Click { player, click } => write!(f, "Click({}, {:?})", player, click),
            SessionCommand::Arm { player, target, .. } => {
                write!(f, "Arm({}, {:?})", player, target)
            }
            SessionCommand::Confirm { player, target, .. } => {
                write!(f, "Confirm({}, {:?})", player, target)
            }
            SessionCommand::Cancel { player, .. } => write!(f, "Cancel({})", player),
            SessionCommand::Notify { player, .. } => write!(f, "Notify({})", player),
            SessionCommand::Snapshot { player, .. } => write!(f, "Snapshot({})", player),
            SessionCommand::ExpirePending { player, seq } => {
                write!(f, "ExpirePending({}, {})", player, seq)
            }
            SessionCommand::Complete(c) => write!(f, "{:?}", c),
            SessionCommand::Disconnect { player } => write!(f, "Disconnect({})", player),
            SessionCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// A rendered screen as sent to the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenView {
    pub title: String,
    pub generation: u64,
    pub grid: Grid,
}

/// Events emitted by the session loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A screen was built or rebuilt
    ScreenShown { player: PlayerId, view: ScreenView },
    ScreenClosed { player: PlayerId, title: String },
    Message { player: PlayerId, text: String },
    InputRequested {
        player: PlayerId,
        prompt: String,
        cancel_keyword: String,
    },
    SessionEnded { player: PlayerId },
}

impl SessionEvent {
    pub fn player(&self) -> &PlayerId {
        match self {
            SessionEvent::ScreenShown { player, .. }
            | SessionEvent::ScreenClosed { player, .. }
            | SessionEvent::Message { player, .. }
            | SessionEvent::InputRequested { player, .. }
            | SessionEvent::SessionEnded { player } => player,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Failed to send {0} command: session loop stopped")]
    LoopStopped(&'static str),

    #[error("Session loop dropped the {0} response")]
    NoResponse(&'static str),
}

/// Handle to the session loop
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    event_rx: Arc<Mutex<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl SessionHandle {
    /// Create the session loop and spawn it
    pub fn new(services: Arc<GuildServices>, config: SessionConfig) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = SessionManager::new(services, config, command_tx.clone(), event_tx);
        let task = SessionLoop {
            manager,
            command_rx,
        }
        .spawn();

        (
            SessionHandle {
                command_tx,
                event_rx: Arc::new(Mutex::new(event_rx)),
            },
            task,
        )
    }

    async fn send(&self, command: SessionCommand, name: &'static str) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::LoopStopped(name))
    }

    async fn request<T>(
        &self,
        name: &'static str,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(build(response_tx), name).await?;
        response_rx.await.map_err(|_| SessionError::NoResponse(name))
    }

    pub async fn open<S: Screen>(&self, player: &PlayerId, screen: S) -> Result<(), SessionError> {
        self.open_boxed(player, Box::new(screen)).await
    }

    pub async fn open_boxed(
        &self,
        player: &PlayerId,
        screen: Box<dyn Screen>,
    ) -> Result<(), SessionError> {
        let player = player.clone();
        self.send(SessionCommand::Open { player, screen }, "open").await
    }

    pub async fn close(&self, player: &PlayerId) -> Result<(), SessionError> {
        let player = player.clone();
        self.send(SessionCommand::Close { player }, "close").await
    }

    pub async fn refresh(&self, player: &PlayerId) -> Result<(), SessionError> {
        let player = player.clone();
        self.send(SessionCommand::Refresh { player }, "refresh").await
    }

    pub async fn enter_input(
        &self,
        player: &PlayerId,
        prompt: InputPrompt,
    ) -> Result<(), SessionError> {
        let player = player.clone();
        self.send(SessionCommand::EnterInput { player, prompt }, "enter_input")
            .await
    }

    /// Offer a chat line to the session; see [`InputDispatch::consumed`]
    pub async fn input(&self, player: &PlayerId, text: &str) -> Result<InputDispatch, SessionError> {
        let player = player.clone();
        let text = text.to_string();
        self.request("input", |response_tx| SessionCommand::Input {
            player,
            text,
            response_tx,
        })
        .await
    }

    pub async fn click(&self, player: &PlayerId, click: Click) -> Result<(), SessionError> {
        let player = player.clone();
        self.send(SessionCommand::Click { player, click }, "click").await
    }

    pub async fn arm(&self, player: &PlayerId, target: ActionTarget) -> Result<Armed, SessionError> {
        let player = player.clone();
        self.request("arm", |response_tx| SessionCommand::Arm {
            player,
            target,
            response_tx,
        })
        .await
    }

    pub async fn confirm(
        &self,
        player: &PlayerId,
        target: ActionTarget,
    ) -> Result<Result<ActionTarget, ConfirmError>, SessionError> {
        let player = player.clone();
        self.request("confirm", |response_tx| SessionCommand::Confirm {
            player,
            target,
            response_tx,
        })
        .await
    }

    pub async fn cancel(&self, player: &PlayerId) -> Result<Option<ActionTarget>, SessionError> {
        let player = player.clone();
        self.request("cancel", |response_tx| SessionCommand::Cancel {
            player,
            response_tx,
        })
        .await
    }

    pub async fn notify(&self, player: &PlayerId, text: impl Into<String>) -> Result<(), SessionError> {
        let player = player.clone();
        let text = text.into();
        self.send(SessionCommand::Notify { player, text }, "notify").await
    }

    pub async fn snapshot(&self, player: &PlayerId) -> Result<SessionSnapshot, SessionError> {
        let player = player.clone();
        self.request("snapshot", |response_tx| SessionCommand::Snapshot {
            player,
            response_tx,
        })
        .await
    }

    pub async fn disconnect(&self, player: &PlayerId) -> Result<(), SessionError> {
        let player = player.clone();
        self.send(SessionCommand::Disconnect { player }, "disconnect")
            .await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown, "shutdown").await
    }

    /// Receive the next event from the loop
    pub async fn next_event(&self) -> Option<SessionEvent> {
        self.event_rx.lock().await.recv().await
    }

    /// Drain events that are already queued
    pub async fn drain_events(&self) -> Vec<SessionEvent> {
        let mut rx = self.event_rx.lock().await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// The presentation thread: one task that owns all session state
struct SessionLoop {
    manager: SessionManager,
    command_rx: mpsc::Receiver<SessionCommand>,
}

impl SessionLoop {
    fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!("Session loop started");
        while let Some(command) = self.command_rx.recv().await {
            if !self.handle_command(command) {
                break;
            }
        }
        info!("Session loop stopped");
    }

    /// Returns false once the loop should stop
    fn handle_command(&mut self, command: SessionCommand) -> bool {
        debug!(command = ?command, "Session command");
        let manager = &mut self.manager;
        match command {
            SessionCommand::Open { player, screen } => manager.open_screen(&player, screen),
            SessionCommand::Close { player } => manager.close_screen(&player),
            SessionCommand::Refresh { player } => manager.refresh_screen(&player),
            SessionCommand::EnterInput { player, prompt } => {
                manager.enter_input_mode(&player, prompt)
            }
            SessionCommand::Input {
                player,
                text,
                response_tx,
            } => {
                let _ = response_tx.send(manager.dispatch_input(&player, &text));
            }
            SessionCommand::Click { player, click } => manager.click(&player, click),
            SessionCommand::Arm {
                player,
                target,
                response_tx,
            } => {
                let _ = response_tx.send(manager.arm(&player, target));
            }
            SessionCommand::Confirm {
                player,
                target,
                response_tx,
            } => {
                let _ = response_tx.send(manager.confirm(&player, &target));
            }
            SessionCommand::Cancel {
                player,
                response_tx,
            } => {
                let _ = response_tx.send(manager.cancel(&player));
            }
            SessionCommand::Notify { player, text } => manager.notify(&player, text),
            SessionCommand::Snapshot {
                player,
                response_tx,
            } => {
                let _ = response_tx.send(manager.snapshot(&player));
            }
            SessionCommand::ExpirePending { player, seq } => manager.expire_pending(&player, seq),
            SessionCommand::Complete(completion) => manager.complete(completion),
            SessionCommand::Disconnect { player } => manager.disconnect(&player),
            SessionCommand::Shutdown => return false,
        }
        true
    }
}
