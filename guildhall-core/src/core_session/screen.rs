//! The contract every interactive screen implements

use super::context::ScreenContext;
use super::grid::{CellPayload, Click, Grid};
use std::any::Any;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScreenError {
    #[error("Grid size {0} is not a whole number of rows")]
    InvalidSize(usize),

    #[error("Slot {slot} outside a grid of {size}")]
    SlotOutOfRange { slot: usize, size: usize },

    #[error("Screen build failed: {0}")]
    Build(String),
}

/// Upcast helper so completions can recover a screen's concrete type
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A screen shown to one player.
///
/// Handlers run on the session loop and must not block; any store access
/// goes through [`ScreenContext::load`] or [`ScreenContext::spawn`] and is
/// applied back on the loop when it finishes. Navigation requested through
/// the context takes effect after the handler returns.
pub trait Screen: AsAny + Send {
    fn title(&self) -> String;

    /// Cell count, a multiple of 9
    fn size(&self) -> usize {
        27
    }

    /// Render into a cleared grid. An error tears the session down.
    fn build(&mut self, grid: &mut Grid, cx: &mut ScreenContext<'_>) -> Result<(), ScreenError>;

    fn on_interact(
        &mut self,
        click: Click,
        payload: Option<&CellPayload>,
        cx: &mut ScreenContext<'_>,
    );

    /// Called exactly once when the screen is replaced or closed
    fn on_close(&mut self, _cx: &mut ScreenContext<'_>) {}

    /// Drop cached data before an in-place rebuild
    fn refresh(&mut self, _cx: &mut ScreenContext<'_>) {}
}

pub fn downcast_screen_mut<'a, S: Screen>(screen: &'a mut (dyn Screen + 'static)) -> Option<&'a mut S> {
    screen.as_any_mut().downcast_mut::<S>()
}
