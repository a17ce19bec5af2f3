//! I/O layer: oracle transport, filesystem, child processes, config, and logs.

pub mod config;
pub mod materialize;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod runner;
pub mod transcript;
