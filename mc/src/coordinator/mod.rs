//! Coordinator for broadcast and answer collection
//!
//! The Coordinator owns every piece of shared orchestration state and mediates
//! all traffic between callers and adapter frames:
//! - **Broadcast:** fan one request out to every active target
//! - **Collect:** request/response extraction with a per-target deadline
//! - **Inbound:** origin-gated readiness and extraction responses

mod config;
mod core;
mod handle;
mod messages;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{BroadcastReport, Collection, CoordRequest, CoordinatorMetrics, Readiness, Route};
