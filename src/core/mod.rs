// Core modules: loop routines, timing, measurement harness, workloads, errors.
pub mod error;
pub mod faults;
pub mod loops;
pub mod repetition;
pub mod scalar;
pub mod timer;
pub mod workload;
