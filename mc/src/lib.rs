//! Mosaic core - broadcast one prompt to many chat assistants and correlate their answers
//!
//! Each assistant ("target") is driven by an adapter running inside that target's own
//! frame. The core never touches a page; it only speaks the wire protocol to adapters
//! and enforces who may speak back.
//!
//! # Core Concepts
//!
//! - **Origin is identity**: an inbound message is trusted only when the transport-computed
//!   origin belongs to the target the message claims to be from
//! - **Fan-out, never fail-fast**: one broken target never blocks delivery to the others
//! - **Bounded waits**: every extraction resolves exactly once, with an answer or empty
//!   at its deadline
//!
//! # Modules
//!
//! - [`target`] - Target descriptors and the registry
//! - [`attachment`] - Image attachment checks
//! - [`request`] - Validated injection requests
//! - [`protocol`] - Wire messages between coordinator and adapters
//! - [`gate`] - Origin allow-list and identity binding
//! - [`coordinator`] - Actor owning readiness, pending extractions and the active set
//! - [`transport`] - Delivery seam to adapter frames
//! - [`relay`] - Domain-matched re-dispatch to every live surface
//! - [`synthesis`] - Merge several answers through one target

pub mod attachment;
pub mod coordinator;
pub mod gate;
pub mod protocol;
pub mod relay;
pub mod request;
pub mod synthesis;
pub mod target;
pub mod transport;

pub use attachment::{Attachment, AttachmentError};
pub use coordinator::{
    BroadcastReport, Collection, Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorMetrics, Readiness,
    Route,
};
pub use gate::{Admitted, OriginGate, Rejection};
pub use protocol::{Inbound, Message};
pub use relay::{Relay, RelayConfig, RelayOutcome, RelayRequest, Surface, SurfaceDirectory};
pub use request::{AttachmentPolicy, Composed, InjectionRequest, MAX_TEXT_CHARS, ValidationError, compose};
pub use synthesis::{SynthesisError, SynthesisOutcome, Synthesizer, build_meta_prompt};
pub use target::{TargetDescriptor, TargetId, TargetRegistry};
pub use transport::{Transport, TransportError};
