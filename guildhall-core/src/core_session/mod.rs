//! Session layer: one presentation loop owning every player's screen state
//!
//! - [`SessionHandle`]: cloneable entry point; commands in, events out
//! - [`SessionManager`]: at most one screen per player, input capture,
//!   effect application and completion marshaling
//! - [`Screen`]: the contract screens implement against a [`Grid`]
//! - [`PendingActions`]: two-step confirmation with an expiry sweep

pub mod context;
pub mod grid;
pub mod handle;
pub mod input;
pub mod manager;
pub mod pending;
pub mod screen;

/// Identifies one session lifetime; a reopened session gets a new id
pub type SessionId = u64;

pub use context::{Completion, Effect, ScreenContext, ScreenToken};
pub use grid::{Cell, CellPayload, Click, ClickKind, Grid, Pager, COLUMNS};
pub use handle::{ScreenView, SessionCommand, SessionError, SessionEvent, SessionHandle};
pub use input::{InputDispatch, InputPrompt, InputVerdict, RejectPolicy};
pub use manager::{SessionManager, SessionSnapshot};
pub use pending::{ActionTarget, Armed, ConfirmError, PendingActions};
pub use screen::{downcast_screen_mut, AsAny, Screen, ScreenError};
