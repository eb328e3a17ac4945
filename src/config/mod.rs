//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! fleet file (JSON array of servers)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Vec<ServerConfig> handed to the Fleet
//!
//! On change (optional):
//!     watcher.rs detects change
//!     → loader.rs loads new fleet
//!     → Fleet::replace_all applies it transactionally
//! ```
//!
//! # Design Decisions
//! - The fleet file is the only persisted state; runtime fields are never written
//! - Saving a fleet (admin persist) does not apply it
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{EngineSettings, HostConfig, HostKind, Protocol, ServerConfig};
pub use validation::ValidationError;
