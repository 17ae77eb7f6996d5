//! Purpose: Shared library crate behind the `perfloops` CLI and tests.
//! Exports: `api` (stable surface), `core` (loops, timer, repetition tester, workloads).
//! Role: Instruction-throughput microbenchmarks plus the harness that measures them.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
