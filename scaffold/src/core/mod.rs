//! Deterministic, pure logic shared by the scaffolding pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod context;
pub mod diagnose;
pub mod layout;
pub mod sanitize;
pub mod syntax;
pub mod types;
pub mod verdict;
