//! Concrete screens
//!
//! Each screen keeps its own view state (page, loaded data) and renders it
//! in `build`. Data is fetched through `ScreenContext::load`; mutations go
//! through `ScreenContext::spawn` and end in a message plus a refresh.

pub mod actions;
pub mod applications;
pub mod confirm;
pub mod directory;
pub mod invitations;
pub mod members;
pub mod relations;
pub mod settings;

pub use actions::{perform, set_relation, ActionError};
pub use applications::ApplicationsScreen;
pub use confirm::ConfirmScreen;
pub use directory::DirectoryScreen;
pub use invitations::InvitationsScreen;
pub use members::MembersScreen;
pub use relations::RelationsScreen;
pub use settings::SettingsScreen;

use crate::config::SessionConfig;
use crate::core_guild::errors::{FailureKind, UserFacing};
use crate::core_session::{Cell, Grid, Pager, ScreenContext, ScreenError, COLUMNS};
use std::fmt;
use tracing::warn;

/// Fetched data behind a screen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Loadable<T> {
    #[default]
    NotLoaded,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> Loadable<T> {
    /// Mark as loading; true if the caller should start the fetch
    pub fn begin(&mut self) -> bool {
        if matches!(self, Loadable::NotLoaded) {
            *self = Loadable::Loading;
            return true;
        }
        false
    }

    pub fn invalidate(&mut self) {
        *self = Loadable::NotLoaded;
    }

    /// Store a fetch result; failures keep the player's message
    pub fn settle<E: UserFacing + fmt::Display>(&mut self, result: Result<T, E>) {
        *self = match result {
            Ok(value) => Loadable::Ready(value),
            Err(e) => {
                if e.failure_kind() == FailureKind::Facade {
                    warn!(error = %e, "Screen data unavailable");
                }
                Loadable::Failed(e.user_message())
            }
        };
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Loadable::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Grid size for list screens
pub fn list_size(config: &SessionConfig) -> usize {
    config.page_rows.clamp(3, 6) * COLUMNS
}

/// Items per page on a bordered list grid of `size` cells
pub fn per_page(size: usize) -> usize {
    (size / COLUMNS).saturating_sub(2) * (COLUMNS - 2)
}

/// Centre a status line for loading and failure states
pub fn render_status<T>(grid: &mut Grid, state: &Loadable<T>) -> Result<(), ScreenError> {
    let cell = match state {
        Loadable::Failed(message) => Cell::new("BARRIER", "Unavailable").lore(message.clone()),
        _ => Cell::new("CLOCK", "Loading..."),
    };
    let centre = (grid.rows() / 2) * COLUMNS + COLUMNS / 2;
    grid.set(centre, cell)
}

/// Frame a list: border, items, pager controls, and an empty marker
pub fn render_list(
    grid: &mut Grid,
    pager: &Pager,
    cells: Vec<Cell>,
    total: usize,
    empty: &str,
) -> Result<(), ScreenError> {
    grid.fill_border();
    if cells.is_empty() {
        let centre = (grid.rows() / 2) * COLUMNS + COLUMNS / 2;
        return grid.set(centre, Cell::new("PAPER", empty));
    }
    grid.place_all(cells);
    pager.place_controls(grid, total)
}

/// One page out of a fully loaded list
pub fn page_of<T: Clone>(items: &[T], pager: &Pager) -> Vec<T> {
    items
        .iter()
        .skip(pager.offset())
        .take(pager.per_page)
        .cloned()
        .collect()
}

/// Start a spawned mutation that reports its result and refreshes the screen
pub fn mutate<T, E, F>(cx: &mut ScreenContext<'_>, fut: F, success: impl FnOnce(T) -> String + Send + 'static)
where
    T: Send + 'static,
    E: UserFacing + fmt::Display + Send + 'static,
    F: std::future::Future<Output = Result<T, E>> + Send + 'static,
{
    cx.spawn(fut, move |result: Result<T, E>, cx: &mut ScreenContext<'_>| {
        match result {
            Ok(value) => cx.notify(success(value)),
            Err(e) => cx.report(&e),
        }
        cx.refresh();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_guild::errors::{MembershipError, RETRY_MESSAGE};
    use crate::core_store::StoreError;

    #[test]
    fn test_loadable_lifecycle() {
        let mut state: Loadable<u32> = Loadable::default();
        assert!(state.begin());
        assert!(!state.begin());

        state.settle::<MembershipError>(Ok(3));
        assert_eq!(state.ready(), Some(&3));

        state.settle(Err(MembershipError::Store(StoreError::Unavailable("db".into()))));
        assert_eq!(state, Loadable::Failed(RETRY_MESSAGE.to_string()));

        state.invalidate();
        assert!(state.begin());
    }

    #[test]
    fn test_list_geometry() {
        let config = SessionConfig::default();
        assert_eq!(list_size(&config), 54);
        assert_eq!(per_page(54), 28);
        assert_eq!(per_page(27), 7);
    }
}
