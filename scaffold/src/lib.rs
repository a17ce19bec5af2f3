//! Agentic project scaffolder.
//!
//! Given a free-form task, the agent asks a chat oracle for a project layout,
//! generates each file against what already exists, runs the entry file with
//! bounded missing-module recovery, and asks the oracle to review the result.
//!
//! - **[`core`]**: Pure logic (layout invariants, sanitizing, syntax checks,
//!   diagnosis, verdict parsing). No I/O.
//! - **[`io`]**: Side effects (oracle transport, filesystem, child processes,
//!   configuration, transcripts). Behind traits where tests substitute fakes.
//!
//! [`agent`] coordinates the two to implement a run.

pub mod agent;
pub mod cancel;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
