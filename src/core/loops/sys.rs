// Raw entry points to the assembly loop routines, one backend per target.
//
// aarch64: the routines expect their arguments in fixed registers (MOV takes
// x1/x2, not x0/x1), so they are reached with `bl` from inline asm instead of
// an `extern "C"` call.
// x86_64: the routines use System V argument registers and are plain C calls.
// Anything else: portable loops with the same observable effects.

#[cfg(all(perfloops_asm, target_arch = "aarch64"))]
mod imp {
    use std::arch::asm;

    pub const BACKEND: &str = "aarch64-asm";

    // Register contract, not AAPCS64: only ever reached through the wrappers below.
    unsafe extern "C" {
        fn ASM_MOVAllBytesASM();
        fn ASM_NOPAllBytesASM();
        fn ASM_CMPAllBytesASM();
        fn ASM_DECAllBytesASM();
    }

    /// # Safety
    ///
    /// `buffer` must be valid for writes of `count` bytes.
    #[inline(never)]
    pub unsafe fn mov_all_bytes(buffer: *mut u8, count: u64) {
        unsafe {
            asm!(
                "bl {routine}",
                routine = sym ASM_MOVAllBytesASM,
                in("x1") buffer,
                in("x2") count,
                clobber_abi("C"),
            );
        }
    }

    #[inline(never)]
    pub fn nop_all_bytes(count: u64) {
        // SAFETY: the routine only touches x0/x1 and flags.
        unsafe {
            asm!(
                "bl {routine}",
                routine = sym ASM_NOPAllBytesASM,
                in("x0") count,
                clobber_abi("C"),
            );
        }
    }

    #[inline(never)]
    pub fn cmp_all_bytes(count: u64) {
        // SAFETY: the routine only touches x0/x1 and flags.
        unsafe {
            asm!(
                "bl {routine}",
                routine = sym ASM_CMPAllBytesASM,
                in("x0") count,
                clobber_abi("C"),
            );
        }
    }

    #[inline(never)]
    pub fn dec_all_bytes(count: u64) {
        // SAFETY: the routine only touches x0 and flags.
        unsafe {
            asm!(
                "bl {routine}",
                routine = sym ASM_DECAllBytesASM,
                in("x0") count,
                clobber_abi("C"),
            );
        }
    }
}

#[cfg(all(perfloops_asm, target_arch = "x86_64"))]
mod imp {
    pub const BACKEND: &str = "x86_64-asm";

    unsafe extern "C" {
        fn ASM_MOVAllBytesASM(buffer: *mut u8, count: u64);
        fn ASM_NOPAllBytesASM(count: u64);
        fn ASM_CMPAllBytesASM(count: u64);
        fn ASM_DECAllBytesASM(count: u64);
    }

    /// # Safety
    ///
    /// `buffer` must be valid for writes of `count` bytes.
    pub unsafe fn mov_all_bytes(buffer: *mut u8, count: u64) {
        unsafe { ASM_MOVAllBytesASM(buffer, count) }
    }

    pub fn nop_all_bytes(count: u64) {
        // SAFETY: register-only loop, no memory access.
        unsafe { ASM_NOPAllBytesASM(count) }
    }

    pub fn cmp_all_bytes(count: u64) {
        // SAFETY: register-only loop, no memory access.
        unsafe { ASM_CMPAllBytesASM(count) }
    }

    pub fn dec_all_bytes(count: u64) {
        // SAFETY: register-only loop, no memory access.
        unsafe { ASM_DECAllBytesASM(count) }
    }
}

#[cfg(not(all(perfloops_asm, any(target_arch = "aarch64", target_arch = "x86_64"))))]
mod imp {
    use std::hint::black_box;

    pub const BACKEND: &str = "portable";

    /// # Safety
    ///
    /// `buffer` must be valid for writes of `count` bytes.
    #[inline(never)]
    pub unsafe fn mov_all_bytes(buffer: *mut u8, count: u64) {
        for index in 0..count {
            unsafe { buffer.add(index as usize).write_volatile(index as u8) };
        }
    }

    #[inline(never)]
    pub fn nop_all_bytes(count: u64) {
        for index in 0..count {
            black_box(index);
        }
    }

    #[inline(never)]
    pub fn cmp_all_bytes(count: u64) {
        let mut index = 0u64;
        while black_box(index) < count {
            index += 1;
        }
    }

    #[inline(never)]
    pub fn dec_all_bytes(count: u64) {
        let mut remaining = count;
        while black_box(remaining) != 0 {
            remaining -= 1;
        }
    }
}

pub use imp::{BACKEND, cmp_all_bytes, dec_all_bytes, mov_all_bytes, nop_all_bytes};
