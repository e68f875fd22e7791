#![allow(clippy::new_without_default)]

pub mod error;
pub mod level;
pub mod logging;
pub mod time;

pub use level::Level;
pub use slog::{crit, debug, error, info, o, trace, warn, Logger};
