//! Purpose: Define the public Rust API boundary for perfloops.
//! Exports: Loop kernels, timer helpers, the repetition tester, workloads and errors.
//! Role: Additive-only surface used by the CLI; internal module layout may move.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::loops::{
    Kernel, backend, cmp_all_bytes, dec_all_bytes, mov_all_bytes, mov_bytes, nop_all_bytes,
    run_kernel,
};
pub use crate::core::repetition::{RepetitionConfig, RepetitionReport, RepetitionTester, Stat};
pub use crate::core::scalar::ScalarVariant;
pub use crate::core::timer::{cpu_timer_freq, read_cpu_timer, ticks_to_duration};
pub use crate::core::workload::{ReadMethod, file_len, read_file_once};
