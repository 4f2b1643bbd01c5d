//! Domain types and pure logic for batch media generation.
//!
//! Everything here is free of network and storage concerns so it can be
//! exercised directly from unit tests: the job/task state machine, the
//! generation parameter rules and the retry policy.

pub mod error;
pub mod generation;
pub mod job;
pub mod retry;
pub mod types;
