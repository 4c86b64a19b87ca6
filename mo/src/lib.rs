//! Mosaic - broadcast one prompt to many chat assistants and merge their answers
//!
//! # Modules
//!
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//! - [`host`] - In-process frame host (transport and relay directory)
//! - [`session`] - End-to-end broadcast, collection and synthesis

pub mod cli;
pub mod config;
pub mod host;
pub mod session;

pub use config::Config;
pub use host::{COORDINATOR_ORIGIN, FrameHost};
pub use session::{Runtime, SessionPlan, SessionReport, run_session};
