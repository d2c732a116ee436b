//! What a screen handler can see and request while it runs on the loop

use super::handle::SessionCommand;
use super::input::InputPrompt;
use super::pending::{ActionTarget, Armed, ConfirmError, PendingActions};
use super::screen::{downcast_screen_mut, Screen};
use super::SessionId;
use crate::config::SessionConfig;
use crate::core_guild::errors::{FailureKind, UserFacing};
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::PlayerId;
use crate::metrics::{self, CONFIRMATIONS_ARMED, CONFIRMATIONS_CONFIRMED};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Navigation and output requested by a handler, applied once it returns
pub enum Effect {
    Open(Box<dyn Screen>),
    Close,
    Refresh,
    EnterInput(InputPrompt),
    Notify(String),
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Open(screen) => write!(f, "Open({})", screen.title()),
            Effect::Close => write!(f, "Close"),
            Effect::Refresh => write!(f, "Refresh"),
            Effect::EnterInput(prompt) => write!(f, "EnterInput({:?})", prompt.prompt),
            Effect::Notify(text) => write!(f, "Notify({:?})", text),
        }
    }
}

/// Identity of one installed screen within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenToken {
    pub session_id: SessionId,
    pub generation: u64,
    /// Bumped each time the screen is refreshed in place
    pub epoch: u64,
}

type ScreenApply = Box<dyn FnOnce(&mut (dyn Screen + 'static), &mut ScreenContext<'_>) + Send>;
type SessionApply = Box<dyn FnOnce(&mut ScreenContext<'_>) + Send>;

pub(crate) enum CompletionTarget {
    /// Applies only if the same screen instance is still shown and has not
    /// been refreshed since the work started
    Screen {
        generation: u64,
        epoch: u64,
        apply: ScreenApply,
    },
    /// Applies while the session that started it is alive
    Session { apply: SessionApply },
}

/// Result of background work, marshaled back onto the loop
pub struct Completion {
    pub(crate) player: PlayerId,
    pub(crate) session_id: SessionId,
    pub(crate) target: CompletionTarget,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let generation = match &self.target {
            CompletionTarget::Screen { generation, .. } => Some(*generation),
            CompletionTarget::Session { .. } => None,
        };
        f.debug_struct("Completion")
            .field("player", &self.player)
            .field("session_id", &self.session_id)
            .field("generation", &generation)
            .finish_non_exhaustive()
    }
}

pub struct ScreenContext<'a> {
    pub(crate) player: &'a PlayerId,
    pub(crate) session_id: SessionId,
    pub(crate) token: Option<ScreenToken>,
    pub(crate) services: &'a Arc<GuildServices>,
    pub(crate) config: &'a SessionConfig,
    pub(crate) commands: &'a mpsc::Sender<SessionCommand>,
    pub(crate) pending: &'a mut PendingActions,
    pub(crate) in_flight: &'a mut HashMap<SessionId, usize>,
    pub(crate) effects: &'a mut VecDeque<Effect>,
}

impl<'a> ScreenContext<'a> {
    /// The player this session belongs to
    pub fn player(&self) -> &PlayerId {
        self.player
    }

    pub fn services(&self) -> &Arc<GuildServices> {
        self.services
    }

    pub fn config(&self) -> &SessionConfig {
        self.config
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn token(&self) -> Option<ScreenToken> {
        self.token
    }

    pub fn open<S: Screen>(&mut self, screen: S) {
        self.effects.push_back(Effect::Open(Box::new(screen)));
    }

    pub fn open_boxed(&mut self, screen: Box<dyn Screen>) {
        self.effects.push_back(Effect::Open(screen));
    }

    pub fn close(&mut self) {
        self.effects.push_back(Effect::Close);
    }

    pub fn refresh(&mut self) {
        self.effects.push_back(Effect::Refresh);
    }

    pub fn notify(&mut self, text: impl Into<String>) {
        self.effects.push_back(Effect::Notify(text.into()));
    }

    pub fn enter_input(&mut self, prompt: InputPrompt) {
        self.effects.push_back(Effect::EnterInput(prompt));
    }

    /// Tell the player why an operation failed. Facade failures are logged.
    pub fn report<E: UserFacing + fmt::Display>(&mut self, err: &E) {
        if err.failure_kind() == FailureKind::Facade {
            warn!(player = %self.player, error = %err, "Operation failed in data layer");
        }
        self.notify(err.user_message());
    }

    /// Run `fut` off the loop, then hand its output to the current screen.
    ///
    /// The result is dropped if the screen has been replaced or refreshed, or
    /// the session has ended, by the time it arrives. The screen is rebuilt
    /// after `apply`.
    pub fn load<S, T, F, A>(&mut self, fut: F, apply: A)
    where
        S: Screen,
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        A: FnOnce(&mut S, T, &mut ScreenContext<'_>) + Send + 'static,
    {
        let Some(token) = self.token else {
            debug!(player = %self.player, "Load requested outside a screen; ignored");
            return;
        };
        let player = self.player.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let value = fut.await;
            let apply: ScreenApply = Box::new(
                move |screen: &mut (dyn Screen + 'static), cx: &mut ScreenContext<'_>| {
                    match downcast_screen_mut::<S>(screen) {
                        Some(screen) => apply(screen, value, cx),
                        None => debug!("Completion for a different screen type; dropped"),
                    }
                },
            );
            let completion = Completion {
                player,
                session_id: token.session_id,
                target: CompletionTarget::Screen {
                    generation: token.generation,
                    epoch: token.epoch,
                    apply,
                },
            };
            if commands.send(SessionCommand::Complete(completion)).await.is_err() {
                debug!("Session loop gone before completion delivered");
            }
        });
    }

    /// Run `fut` off the loop and continue with `then` while the session lives.
    ///
    /// The session is kept open until `then` has run, even with no screen shown.
    pub fn spawn<T, F, A>(&mut self, fut: F, then: A)
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        A: FnOnce(T, &mut ScreenContext<'_>) + Send + 'static,
    {
        *self.in_flight.entry(self.session_id).or_default() += 1;
        let player = self.player.clone();
        let session_id = self.session_id;
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let value = fut.await;
            let apply: SessionApply = Box::new(move |cx: &mut ScreenContext<'_>| then(value, cx));
            let completion = Completion {
                player,
                session_id,
                target: CompletionTarget::Session { apply },
            };
            if commands.send(SessionCommand::Complete(completion)).await.is_err() {
                debug!("Session loop gone before completion delivered");
            }
        });
    }

    /// Arm a destructive action for this player and schedule its expiry
    pub fn arm(&mut self, target: ActionTarget) -> Armed {
        arm_pending(self.pending, self.commands, self.player, target)
    }

    pub fn confirm(&mut self, target: &ActionTarget) -> Result<ActionTarget, ConfirmError> {
        confirm_pending(self.pending, self.player, target)
    }

    pub fn cancel_pending(&mut self) -> Option<ActionTarget> {
        self.pending.cancel(self.player)
    }

    pub fn pending(&self) -> Option<&ActionTarget> {
        self.pending.pending(self.player, Instant::now())
    }
}

/// Arm `target` and send an expiry sweep back to the loop at its deadline
pub(crate) fn arm_pending(
    pending: &mut PendingActions,
    commands: &mpsc::Sender<SessionCommand>,
    player: &PlayerId,
    target: ActionTarget,
) -> Armed {
    let armed = pending.arm(player.clone(), target, Instant::now());
    metrics::record_counter(CONFIRMATIONS_ARMED, 1);
    if let Some(previous) = &armed.previous {
        debug!(player = %player, previous = %previous, "Pending action replaced");
    }

    let commands = commands.clone();
    let player = player.clone();
    let (deadline, seq) = (armed.deadline, armed.seq);
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let _ = commands
            .send(SessionCommand::ExpirePending { player, seq })
            .await;
    });
    armed
}

pub(crate) fn confirm_pending(
    pending: &mut PendingActions,
    player: &PlayerId,
    target: &ActionTarget,
) -> Result<ActionTarget, ConfirmError> {
    let result = pending.confirm(player, target, Instant::now());
    if result.is_ok() {
        metrics::record_counter(CONFIRMATIONS_CONFIRMED, 1);
    }
    result
}
