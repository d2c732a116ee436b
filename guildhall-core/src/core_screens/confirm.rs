//! Two-button dialog in front of a destructive action

use super::actions::perform;
use crate::core_session::input::ScreenFactory;
use crate::core_session::{
    ActionTarget, Cell, CellPayload, Click, Grid, Screen, ScreenContext, ScreenError,
};

const CONFIRM_SLOT: usize = 11;
const INFO_SLOT: usize = 13;
const CANCEL_SLOT: usize = 15;

/// Arms `target` when first shown; the action runs only if the player
/// confirms before the window closes. Closing the dialog any other way
/// cancels the pending action.
pub struct ConfirmScreen {
    target: ActionTarget,
    return_to: Option<ScreenFactory>,
    armed: bool,
    settled: bool,
}

impl ConfirmScreen {
    pub fn new(target: ActionTarget) -> Self {
        Self {
            target,
            return_to: None,
            armed: false,
            settled: false,
        }
    }

    /// Screen to reopen after cancelling
    pub fn return_to<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Screen> + Send + 'static,
    {
        self.return_to = Some(Box::new(factory));
        self
    }

    pub fn target(&self) -> &ActionTarget {
        &self.target
    }

    fn confirm(&mut self, cx: &mut ScreenContext<'_>) {
        self.settled = true;
        match cx.confirm(&self.target) {
            Ok(target) => {
                let services = cx.services().clone();
                let actor = cx.player().clone();
                cx.spawn(
                    async move { perform(&services, &actor, &target).await },
                    |result, cx: &mut ScreenContext<'_>| match result {
                        Ok(message) => cx.notify(message),
                        Err(e) => cx.report(&e),
                    },
                );
                cx.close();
            }
            Err(e) => {
                cx.report(&e);
                cx.close();
            }
        }
    }

    fn cancel(&mut self, cx: &mut ScreenContext<'_>) {
        self.settled = true;
        cx.cancel_pending();
        cx.notify("Cancelled.");
        match self.return_to.as_ref() {
            Some(factory) => cx.open_boxed(factory()),
            None => cx.close(),
        }
    }
}

impl Screen for ConfirmScreen {
    fn title(&self) -> String {
        format!("Confirm: {}", self.target)
    }

    fn build(&mut self, grid: &mut Grid, cx: &mut ScreenContext<'_>) -> Result<(), ScreenError> {
        if !self.armed {
            self.armed = true;
            let armed = cx.arm(self.target.clone());
            if let Some(previous) = armed.previous {
                cx.notify(format!("Your request to {} was replaced.", previous));
            }
        }

        let seconds = cx.config().confirmation_timeout.as_secs();
        grid.fill_border();
        grid.set(
            CONFIRM_SLOT,
            Cell::new("LIME_WOOL", "Confirm").payload(CellPayload::Action("confirm")),
        )?;
        grid.set(
            INFO_SLOT,
            Cell::new("PAPER", format!("Really {}?", self.target))
                .lore(format!("Expires after {} seconds", seconds)),
        )?;
        grid.set(
            CANCEL_SLOT,
            Cell::new("RED_WOOL", "Cancel").payload(CellPayload::Action("cancel")),
        )?;
        Ok(())
    }

    fn on_interact(
        &mut self,
        _click: Click,
        payload: Option<&CellPayload>,
        cx: &mut ScreenContext<'_>,
    ) {
        match payload {
            Some(CellPayload::Action("confirm")) => self.confirm(cx),
            Some(CellPayload::Action("cancel")) => self.cancel(cx),
            _ => {}
        }
    }

    fn on_close(&mut self, cx: &mut ScreenContext<'_>) {
        if !self.settled && cx.pending() == Some(&self.target) {
            cx.cancel_pending();
        }
    }
}
