//! Purpose: Safe front door to the instruction-throughput loop routines.
//! Exports: `Kernel`, `mov_all_bytes`, `mov_bytes`, `nop_all_bytes`, `cmp_all_bytes`,
//! `dec_all_bytes`, `run_kernel`, `backend`.
//! Role: Bounds-checks buffers, then forwards count/pointer unchanged to `sys`.
//! Invariants: Routines return nothing and cannot fail; only argument checks raise errors.
//! Invariants: A zero count executes no loop iterations and writes nothing.
//! Invariants: MOV writes the low byte of the loop index, so `buffer[i] == i as u8`.
mod sys;

use std::fmt;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Kernel {
    Mov,
    Nop,
    Cmp,
    Dec,
}

impl Kernel {
    pub const ALL: [Kernel; 4] = [Kernel::Mov, Kernel::Nop, Kernel::Cmp, Kernel::Dec];

    pub fn parse(input: &str) -> Result<Self, Error> {
        match input.trim().to_ascii_lowercase().as_str() {
            "mov" => Ok(Self::Mov),
            "nop" => Ok(Self::Nop),
            "cmp" => Ok(Self::Cmp),
            "dec" => Ok(Self::Dec),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown kernel `{}`", input.trim()))
                .with_hint("Use one of: mov, nop, cmp, dec.")),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kernel::Mov => "mov",
            Kernel::Nop => "nop",
            Kernel::Cmp => "cmp",
            Kernel::Dec => "dec",
        }
    }

    /// Whether the kernel writes through a buffer.
    pub fn needs_buffer(self) -> bool {
        matches!(self, Kernel::Mov)
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of the compiled-in loop backend (`aarch64-asm`, `x86_64-asm` or `portable`).
pub fn backend() -> &'static str {
    sys::BACKEND
}

pub fn mov_all_bytes(buffer: &mut [u8]) {
    // SAFETY: the count is the slice length, so every write is in bounds.
    unsafe { sys::mov_all_bytes(buffer.as_mut_ptr(), buffer.len() as u64) }
}

/// Runs the MOV loop over the first `count` bytes of `buffer`.
pub fn mov_bytes(buffer: &mut [u8], count: u64) -> Result<(), Error> {
    let len = buffer.len() as u64;
    if count > len {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("count {count} exceeds buffer length {len}")));
    }
    // SAFETY: checked above that `count` bytes fit in the slice.
    unsafe { sys::mov_all_bytes(buffer.as_mut_ptr(), count) }
    Ok(())
}

pub fn nop_all_bytes(count: u64) {
    sys::nop_all_bytes(count)
}

pub fn cmp_all_bytes(count: u64) {
    sys::cmp_all_bytes(count)
}

pub fn dec_all_bytes(count: u64) {
    sys::dec_all_bytes(count)
}

pub fn run_kernel(kernel: Kernel, buffer: &mut [u8], count: u64) -> Result<(), Error> {
    match kernel {
        Kernel::Mov => mov_bytes(buffer, count),
        Kernel::Nop => {
            nop_all_bytes(count);
            Ok(())
        }
        Kernel::Cmp => {
            cmp_all_bytes(count);
            Ok(())
        }
        Kernel::Dec => {
            dec_all_bytes(count);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Kernel, backend, mov_all_bytes, mov_bytes, run_kernel};
    use crate::core::error::ErrorKind;

    #[test]
    fn mov_writes_low_index_byte() {
        let mut buffer = vec![0xAAu8; 600];
        mov_all_bytes(&mut buffer);
        for (index, byte) in buffer.iter().enumerate() {
            assert_eq!(*byte, index as u8, "byte {index}");
        }
    }

    #[test]
    fn mov_bytes_leaves_tail_untouched() {
        let mut buffer = vec![0xAAu8; 64];
        mov_bytes(&mut buffer, 10).expect("mov");
        assert_eq!(&buffer[..10], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert!(buffer[10..].iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn zero_count_writes_nothing() {
        let mut buffer = vec![0xAAu8; 8];
        mov_bytes(&mut buffer, 0).expect("mov");
        assert!(buffer.iter().all(|b| *b == 0xAA));

        let mut empty: Vec<u8> = Vec::new();
        mov_all_bytes(&mut empty);
    }

    #[test]
    fn mov_rejects_count_past_buffer() {
        let mut buffer = vec![0xAAu8; 4];
        let err = mov_bytes(&mut buffer, 5).expect_err("overflow");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(buffer.iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn register_only_kernels_run_for_any_count() {
        let mut unused: Vec<u8> = Vec::new();
        for kernel in [Kernel::Nop, Kernel::Cmp, Kernel::Dec] {
            for count in [0u64, 1, 2, 1000, 100_000] {
                run_kernel(kernel, &mut unused, count).expect("kernel");
            }
        }
    }

    #[test]
    fn kernel_names_round_trip() {
        for kernel in Kernel::ALL {
            assert_eq!(Kernel::parse(kernel.name()).expect("parse"), kernel);
        }
        assert_eq!(Kernel::parse(" NOP ").expect("parse"), Kernel::Nop);
        assert_eq!(
            Kernel::parse("add").expect_err("unknown").kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn backend_matches_target() {
        let name = backend();
        assert!(["aarch64-asm", "x86_64-asm", "portable"].contains(&name));
        if name != "portable" {
            assert!(name.starts_with(std::env::consts::ARCH));
        }
    }
}
