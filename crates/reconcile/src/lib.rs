//! Operand lifecycle reconciler.
//!
//! Converges the custom resources and auxiliary objects behind an operand
//! request: specs are layered template → default configuration → request
//! override, every mutation is gated on the ownership label, writes and
//! deletions are confirmed by bounded polling and bulk deletions fan out
//! concurrently with their failures collected into one [`ErrorList`].
//!
//! [`ErrorList`]: operand_core::ErrorList

#![forbid(unsafe_code)]

pub mod batch;
pub mod config_tier;
pub mod converge;
pub mod driver;
pub mod poll;
pub mod request_tier;
pub mod resources;
pub mod settings;
pub mod sources;
pub mod status;

pub use converge::{Converger, DeleteOutcome};
pub use driver::Reconciler;
pub use settings::Settings;
pub use sources::{ConfigSource, ReadinessSource, RegistrySource, StaticCatalog};
pub use status::StatusHandle;
