//! Domain types shared by every Lumo crate.
//!
//! Pure logic only: job state, asset URL normalization, and the
//! problem-to-UI mapping table. Nothing in here performs I/O.

pub mod assets;
pub mod error;
pub mod job;
pub mod problem;
pub mod types;
