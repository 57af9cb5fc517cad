pub mod config_manager;
pub mod error;
pub mod program;
pub mod traits;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use program::*;
pub use traits::*;
pub use types::*;

/// Cooperative cancellation, polled between units of work.
pub use tokio_util::sync::CancellationToken;
