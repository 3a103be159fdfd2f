//! Job polling, job list reconciliation and the coordinator tying them to
//! the backend client.

pub mod board;
pub mod poller;
pub mod studio;

#[cfg(test)]
mod test_support;

pub use board::{HistoryMerge, JobBoard};
pub use poller::{JobPoller, PollUpdate, Resolution};
pub use studio::Studio;
