//! Mosaic adapter - drives one chat page on behalf of the coordinator
//!
//! # Modules
//!
//! - [`page`] - The page seam and the in-memory [`HtmlPage`]
//! - [`profile`] - Per-target selectors, insertion strategy and submit controls
//! - [`locator`] - Bounded, mutation-driven element lookup
//! - [`insert`] - Rich-text and native-setter insertion
//! - [`injector`] - The injection state machine
//! - [`extract`] - Answer extraction from an HTML snapshot
//! - [`adapter`] - Origin-checked message handling for one frame

pub mod adapter;
pub mod config;
pub mod extract;
pub mod injector;
pub mod insert;
pub mod locator;
pub mod page;
pub mod profile;

pub use adapter::{Adapter, Envelope, Handled, Refusal};
pub use config::AdapterConfig;
pub use injector::{InjectionReport, InjectionState, Injector, SubmitMethod};
pub use insert::Insertion;
pub use page::{Action, Element, ElementHandle, HtmlPage, Page, PageError};
pub use profile::{TargetProfile, profile_for};
