pub mod config;
pub mod dispatch;
pub mod engine;
pub mod limiter;
pub mod reporter;
pub mod stats;
pub mod target;

pub use config::*;
pub use dispatch::*;
pub use engine::*;
pub use limiter::*;
pub use reporter::*;
pub use stats::*;
pub use target::*;
