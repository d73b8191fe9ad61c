pub mod clock;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod time_range;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use domain::*;
pub use error::CoreError;
pub use time_range::{resolve_time_range, ResolvedRange};
