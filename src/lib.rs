pub mod core;
pub mod extract;
pub mod navigate;
pub mod orchestrate;
pub mod session;
pub mod ui;

// --- Primary exports ---
pub use core::types;
pub use core::types::*;
pub use core::{EngineConfig, ExtractError};
pub use orchestrate::{CancelToken, Orchestrator};
pub use session::{PageDriver, SessionManager, SessionProvider};
