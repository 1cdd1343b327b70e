pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::{DriveError, ExtractError};
pub use types::{ExtractionOutcome, FailureKind, FlightObservation, Money, SearchSpec};
