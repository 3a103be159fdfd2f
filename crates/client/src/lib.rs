//! HTTP client for the Lumo generation backend.
//!
//! Wraps job creation, job status, history and credit endpoints behind
//! the [`JobApi`] trait, attaches session credentials transparently, and
//! hides every backend response-shape variation inside [`wire`] so the
//! rest of the workspace only sees canonical types.

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod wire;

pub use api::{ApiClient, JobApi};
pub use config::ClientConfig;
pub use error::ClientError;
pub use session::Session;
