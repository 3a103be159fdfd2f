//! Lumo in-process event bus.
//!
//! - [`EventBus`] is a publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`StudioEvent`] is the set of cross-cutting notifications, such as
//!   "credits changed", that independent consumers react to.

pub mod bus;

pub use bus::{EventBus, StudioEvent};
