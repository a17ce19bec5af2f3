//! Stable exit codes for the `scaffold` CLI.

/// The entry file ran and exited successfully.
pub const OK: i32 = 0;
/// The run was aborted: layout rejected, invalid config, or an I/O failure.
pub const ABORTED: i32 = 1;
/// The entry file ran but failed, after any recovery.
pub const RUN_FAILED: i32 = 2;
/// No entry file with content was available to run.
pub const NO_ENTRY: i32 = 3;
/// The operator interrupted the run (SIGINT/SIGTERM).
pub const CANCELLED: i32 = 130;
