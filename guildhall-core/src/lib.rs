//! Guild management core: guild records and the engines that keep them
//! consistent, plus the session layer that drives per-player screens.

pub mod config;
pub mod core_guild;
pub mod core_screens;
pub mod core_session;
pub mod core_store;
pub mod logging;
pub mod metrics;
pub mod test_utils;

pub use config::{GuildhallConfig, SessionConfig};
pub use core_guild::{GuildServices, PlayerId};
pub use core_session::{SessionEvent, SessionHandle};
pub use logging::{init_logging, LogLevel};
