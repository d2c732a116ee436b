//! Per-player session state, owned by the session loop
//!
//! Every method here runs on the loop. Handlers are invoked with the screen
//! taken out of its session; the navigation they request is queued as
//! [`Effect`]s and applied once they return, so a screen is never replaced
//! while its own handler is still on the stack.

use super::context::{arm_pending, confirm_pending, Completion, CompletionTarget, Effect, ScreenContext, ScreenToken};
use super::grid::{Click, Grid};
use super::handle::{ScreenView, SessionCommand, SessionEvent};
use super::input::{is_cancel, InputDispatch, InputPrompt, InputVerdict, RejectPolicy};
use super::pending::{ActionTarget, Armed, ConfirmError, PendingActions};
use super::screen::{Screen, ScreenError};
use super::SessionId;
use crate::config::SessionConfig;
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::PlayerId;
use crate::metrics::{
    self, Timer, CONFIRMATIONS_EXPIRED, SCREEN_BUILD_MS, SESSIONS_CLOSED, SESSIONS_OPENED,
    SESSIONS_TORN_DOWN, STALE_COMPLETIONS,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Effects applied per top-level call before the rest are dropped
const EFFECT_LIMIT: usize = 64;

struct OpenScreen {
    screen: Box<dyn Screen>,
    generation: u64,
    epoch: u64,
    grid: Grid,
}

struct Session {
    id: SessionId,
    screen: Option<OpenScreen>,
    capture: Option<InputPrompt>,
}

/// Read-only view of one player's session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub title: Option<String>,
    pub generation: Option<u64>,
    pub grid: Option<Grid>,
    pub capturing: bool,
    pub pending: Option<ActionTarget>,
}

pub struct SessionManager {
    services: Arc<GuildServices>,
    config: SessionConfig,
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    sessions: HashMap<PlayerId, Session>,
    pending: PendingActions,
    /// Session-bound work started per session and not yet completed
    in_flight: HashMap<SessionId, usize>,
    next_session: SessionId,
    next_generation: u64,
}

impl SessionManager {
    /// `commands` is the loop's own channel; background work reports back on it
    pub fn new(
        services: Arc<GuildServices>,
        config: SessionConfig,
        commands: mpsc::Sender<SessionCommand>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            services,
            pending: PendingActions::new(config.confirmation_timeout),
            config,
            commands,
            events,
            sessions: HashMap::new(),
            in_flight: HashMap::new(),
            next_session: 0,
            next_generation: 0,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, player: &PlayerId) -> bool {
        self.sessions.contains_key(player)
    }

    pub fn snapshot(&self, player: &PlayerId) -> SessionSnapshot {
        let session = self.sessions.get(player);
        let open = session.and_then(|s| s.screen.as_ref());
        SessionSnapshot {
            session_id: session.map(|s| s.id),
            title: open.map(|o| o.screen.title()),
            generation: open.map(|o| o.generation),
            grid: open.map(|o| o.grid.clone()),
            capturing: session.map(|s| s.capture.is_some()).unwrap_or(false),
            pending: self.pending.pending(player, Instant::now()).cloned(),
        }
    }

    /// Show `screen`, closing whatever the player had open
    pub fn open_screen(&mut self, player: &PlayerId, screen: Box<dyn Screen>) {
        let mut effects = VecDeque::new();
        self.install(player, screen, &mut effects);
        self.drain(player, effects);
    }

    /// Close the current screen. Ends the session unless it is capturing
    /// input, the closing screen opened another one, or spawned work is
    /// still due back.
    pub fn close_screen(&mut self, player: &PlayerId) {
        let mut effects = VecDeque::new();
        self.close_current(player, &mut effects);
        self.drain(player, effects);
        self.end_if_idle(player);
    }

    /// Rebuild the current screen in place; its identity is unchanged
    pub fn refresh_screen(&mut self, player: &PlayerId) {
        let mut effects = VecDeque::new();
        self.rebuild(player, true, &mut effects);
        self.drain(player, effects);
    }

    pub fn enter_input_mode(&mut self, player: &PlayerId, prompt: InputPrompt) {
        let mut effects = VecDeque::new();
        self.begin_capture(player, prompt, &mut effects);
        self.drain(player, effects);
    }

    /// Route a line of chat. Returns `NotCapturing` when the player has no
    /// active prompt, in which case the text belongs to normal chat.
    pub fn dispatch_input(&mut self, player: &PlayerId, text: &str) -> InputDispatch {
        let Some(session) = self.sessions.get_mut(player) else {
            return InputDispatch::NotCapturing;
        };
        let session_id = session.id;
        let Some(mut prompt) = session.capture.take() else {
            return InputDispatch::NotCapturing;
        };

        let mut effects = VecDeque::new();
        if is_cancel(text, &self.config.input_cancel_keyword) {
            debug!(player = %player, "Input cancelled");
            effects.push_back(Effect::Notify("Input cancelled.".to_string()));
            if let Some(origin) = prompt.reopen_origin() {
                effects.push_back(Effect::Open(origin));
            }
            self.drain(player, effects);
            return InputDispatch::Cancelled;
        }

        let verdict = {
            let mut cx = self.context(player, session_id, None, &mut effects);
            (prompt.validator)(text, &mut cx)
        };

        let outcome = match verdict {
            InputVerdict::Accept => InputDispatch::Accepted,
            InputVerdict::Reject(reason) => {
                effects.push_front(Effect::Notify(reason));
                match prompt.on_reject {
                    RejectPolicy::KeepCapturing => {
                        effects.push_back(Effect::EnterInput(prompt));
                    }
                    RejectPolicy::ReturnToOrigin => {
                        if let Some(origin) = prompt.reopen_origin() {
                            effects.push_back(Effect::Open(origin));
                        }
                    }
                }
                InputDispatch::Rejected
            }
        };

        self.drain(player, effects);
        self.end_if_idle(player);
        outcome
    }

    /// Deliver a click to the open screen. Clicks without a screen or
    /// outside the grid are ignored.
    pub fn click(&mut self, player: &PlayerId, click: Click) {
        let Some(session) = self.sessions.get_mut(player) else {
            debug!(player = %player, "Click without a session");
            return;
        };
        let session_id = session.id;
        let in_range = session
            .screen
            .as_ref()
            .map(|o| click.slot < o.grid.size())
            .unwrap_or(false);
        if !in_range {
            debug!(player = %player, slot = click.slot, "Click ignored");
            return;
        }
        let Some(mut open) = session.screen.take() else {
            return;
        };

        let payload = open.grid.get(click.slot).and_then(|c| c.payload.clone());
        let mut effects = VecDeque::new();
        {
            let token = Some(ScreenToken {
                session_id,
                generation: open.generation,
                epoch: open.epoch,
            });
            let mut cx = self.context(player, session_id, token, &mut effects);
            open.screen.on_interact(click, payload.as_ref(), &mut cx);
        }
        self.restore(player, session_id, open);
        self.drain(player, effects);
        self.end_if_idle(player);
    }

    /// Apply background work that finished off the loop.
    ///
    /// Completions for a session that has ended, or for a screen that is no
    /// longer shown or has been refreshed since the load started, are
    /// discarded.
    pub fn complete(&mut self, completion: Completion) {
        let Completion {
            player,
            session_id,
            target,
        } = completion;

        if let CompletionTarget::Session { .. } = &target {
            if let Some(count) = self.in_flight.get_mut(&session_id) {
                *count = count.saturating_sub(1);
            }
        }

        let Some(session) = self.sessions.get_mut(&player).filter(|s| s.id == session_id) else {
            stale(&player, "session ended");
            return;
        };

        let mut effects = VecDeque::new();
        match target {
            CompletionTarget::Screen {
                generation,
                epoch,
                apply,
            } => {
                match session.screen.as_ref() {
                    Some(open) if open.generation != generation => {
                        stale(&player, "screen replaced");
                        return;
                    }
                    Some(open) if open.epoch != epoch => {
                        stale(&player, "screen refreshed");
                        return;
                    }
                    Some(_) => {}
                    None => {
                        stale(&player, "screen closed");
                        return;
                    }
                }
                let Some(mut open) = session.screen.take() else {
                    return;
                };
                {
                    let token = Some(ScreenToken {
                        session_id,
                        generation,
                        epoch,
                    });
                    let mut cx = self.context(&player, session_id, token, &mut effects);
                    apply(&mut *open.screen, &mut cx);
                }
                match self.render(&player, session_id, &mut open, &mut effects) {
                    Ok(()) => {
                        self.show(&player, &open);
                        self.restore(&player, session_id, open);
                    }
                    Err(e) => self.tear_down(&player, &open.screen.title(), e, &mut effects),
                }
            }
            CompletionTarget::Session { apply } => {
                let mut cx = self.context(&player, session_id, None, &mut effects);
                apply(&mut cx);
            }
        }
        self.drain(&player, effects);
        self.end_if_idle(&player);
    }

    pub fn notify(&mut self, player: &PlayerId, text: String) {
        self.emit(SessionEvent::Message {
            player: player.clone(),
            text,
        });
    }

    pub fn arm(&mut self, player: &PlayerId, target: ActionTarget) -> Armed {
        arm_pending(&mut self.pending, &self.commands, player, target)
    }

    pub fn confirm(
        &mut self,
        player: &PlayerId,
        target: &ActionTarget,
    ) -> Result<ActionTarget, ConfirmError> {
        confirm_pending(&mut self.pending, player, target)
    }

    pub fn cancel(&mut self, player: &PlayerId) -> Option<ActionTarget> {
        self.pending.cancel(player)
    }

    /// Sweep fired for the entry armed with `seq`
    pub fn expire_pending(&mut self, player: &PlayerId, seq: u64) {
        if let Some(target) = self.pending.expire(player, seq, Instant::now()) {
            metrics::record_counter(CONFIRMATIONS_EXPIRED, 1);
            info!(player = %player, action = %target, "Pending action expired");
            self.notify(player, format!("The request to {} has expired.", target));
        }
    }

    /// Tear down everything held for `player`
    pub fn disconnect(&mut self, player: &PlayerId) {
        // on_close still runs, but nothing it requests is applied
        let mut effects = VecDeque::new();
        self.close_current(player, &mut effects);
        self.pending.forget(player);
        self.end_session(player);
    }

    fn context<'a>(
        &'a mut self,
        player: &'a PlayerId,
        session_id: SessionId,
        token: Option<ScreenToken>,
        effects: &'a mut VecDeque<Effect>,
    ) -> ScreenContext<'a> {
        ScreenContext {
            player,
            session_id,
            token,
            services: &self.services,
            config: &self.config,
            commands: &self.commands,
            pending: &mut self.pending,
            in_flight: &mut self.in_flight,
            effects,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No listener for session events");
        }
    }

    fn ensure_session(&mut self, player: &PlayerId) -> SessionId {
        if let Some(session) = self.sessions.get(player) {
            return session.id;
        }
        self.next_session += 1;
        let id = self.next_session;
        self.sessions.insert(
            player.clone(),
            Session {
                id,
                screen: None,
                capture: None,
            },
        );
        debug!(player = %player, session = id, "Session created");
        id
    }

    fn end_session(&mut self, player: &PlayerId) {
        if let Some(session) = self.sessions.remove(player) {
            self.in_flight.remove(&session.id);
            debug!(player = %player, session = session.id, "Session ended");
            self.emit(SessionEvent::SessionEnded {
                player: player.clone(),
            });
        }
    }

    /// End a session left with no screen, no prompt and nothing in flight
    fn end_if_idle(&mut self, player: &PlayerId) {
        let idle = self
            .sessions
            .get(player)
            .map(|s| {
                s.screen.is_none()
                    && s.capture.is_none()
                    && self.in_flight.get(&s.id).copied().unwrap_or(0) == 0
            })
            .unwrap_or(false);
        if idle {
            self.end_session(player);
        }
    }

    fn install(&mut self, player: &PlayerId, screen: Box<dyn Screen>, effects: &mut VecDeque<Effect>) {
        self.close_current(player, effects);
        let session_id = self.ensure_session(player);
        if let Some(session) = self.sessions.get_mut(player) {
            if session.capture.take().is_some() {
                debug!(player = %player, "Input capture dropped by screen open");
            }
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let title = screen.title();
        let grid = match Grid::new(screen.size()) {
            Ok(grid) => grid,
            Err(e) => {
                self.tear_down(player, &title, e, effects);
                return;
            }
        };

        let mut open = OpenScreen {
            screen,
            generation,
            epoch: 0,
            grid,
        };
        match self.render(player, session_id, &mut open, effects) {
            Ok(()) => {
                metrics::record_counter(SESSIONS_OPENED, 1);
                debug!(player = %player, screen = %title, generation, "Screen opened");
                self.show(player, &open);
                self.restore(player, session_id, open);
            }
            Err(e) => self.tear_down(player, &title, e, effects),
        }
    }

    fn close_current(&mut self, player: &PlayerId, effects: &mut VecDeque<Effect>) {
        let Some(session) = self.sessions.get_mut(player) else {
            return;
        };
        let session_id = session.id;
        let Some(mut open) = session.screen.take() else {
            return;
        };

        {
            let token = Some(ScreenToken {
                session_id,
                generation: open.generation,
                epoch: open.epoch,
            });
            let mut cx = self.context(player, session_id, token, effects);
            open.screen.on_close(&mut cx);
        }
        metrics::record_counter(SESSIONS_CLOSED, 1);
        self.emit(SessionEvent::ScreenClosed {
            player: player.clone(),
            title: open.screen.title(),
        });
    }

    fn rebuild(&mut self, player: &PlayerId, invalidate: bool, effects: &mut VecDeque<Effect>) {
        let Some(session) = self.sessions.get_mut(player) else {
            return;
        };
        let session_id = session.id;
        let Some(mut open) = session.screen.take() else {
            return;
        };

        if invalidate {
            // Loads started before this point carry the old epoch
            open.epoch += 1;
            let token = Some(ScreenToken {
                session_id,
                generation: open.generation,
                epoch: open.epoch,
            });
            let mut cx = self.context(player, session_id, token, effects);
            open.screen.refresh(&mut cx);
        }
        match self.render(player, session_id, &mut open, effects) {
            Ok(()) => {
                self.show(player, &open);
                self.restore(player, session_id, open);
            }
            Err(e) => self.tear_down(player, &open.screen.title(), e, effects),
        }
    }

    fn begin_capture(&mut self, player: &PlayerId, prompt: InputPrompt, effects: &mut VecDeque<Effect>) {
        self.close_current(player, effects);
        self.ensure_session(player);

        let text = prompt.prompt.clone();
        if let Some(session) = self.sessions.get_mut(player) {
            session.capture = Some(prompt);
        }
        self.emit(SessionEvent::InputRequested {
            player: player.clone(),
            prompt: text,
            cancel_keyword: self.config.input_cancel_keyword.clone(),
        });
    }

    fn render(
        &mut self,
        player: &PlayerId,
        session_id: SessionId,
        open: &mut OpenScreen,
        effects: &mut VecDeque<Effect>,
    ) -> Result<(), ScreenError> {
        let timer = Timer::new(SCREEN_BUILD_MS);
        open.grid.clear();
        let token = Some(ScreenToken {
            session_id,
            generation: open.generation,
            epoch: open.epoch,
        });
        let mut cx = self.context(player, session_id, token, effects);
        let result = open.screen.build(&mut open.grid, &mut cx);
        timer.stop();
        result
    }

    fn show(&self, player: &PlayerId, open: &OpenScreen) {
        self.emit(SessionEvent::ScreenShown {
            player: player.clone(),
            view: ScreenView {
                title: open.screen.title(),
                generation: open.generation,
                grid: open.grid.clone(),
            },
        });
    }

    /// Put a screen back after its handler ran
    fn restore(&mut self, player: &PlayerId, session_id: SessionId, open: OpenScreen) {
        match self.sessions.get_mut(player) {
            Some(session) if session.id == session_id && session.screen.is_none() => {
                session.screen = Some(open);
            }
            _ => debug!(player = %player, "Session changed while handler ran; screen dropped"),
        }
    }

    fn tear_down(
        &mut self,
        player: &PlayerId,
        title: &str,
        error: ScreenError,
        effects: &mut VecDeque<Effect>,
    ) {
        warn!(player = %player, screen = %title, error = %error, "Screen failed to build; session torn down");
        metrics::record_counter(SESSIONS_TORN_DOWN, 1);
        effects.clear();
        if let Some(session) = self.sessions.get_mut(player) {
            session.capture = None;
        }
        self.end_session(player);
    }

    fn drain(&mut self, player: &PlayerId, mut effects: VecDeque<Effect>) {
        let mut applied = 0;
        while let Some(effect) = effects.pop_front() {
            applied += 1;
            if applied > EFFECT_LIMIT {
                warn!(player = %player, dropped = effects.len() + 1, "Too many chained screen effects");
                break;
            }
            match effect {
                Effect::Open(screen) => self.install(player, screen, &mut effects),
                Effect::Close => self.close_current(player, &mut effects),
                Effect::Refresh => self.rebuild(player, true, &mut effects),
                Effect::EnterInput(prompt) => self.begin_capture(player, prompt, &mut effects),
                Effect::Notify(text) => self.notify(player, text),
            }
        }
    }
}

fn stale(player: &PlayerId, reason: &str) {
    metrics::record_counter(STALE_COMPLETIONS, 1);
    debug!(player = %player, reason, "Stale completion discarded");
}
