//! Purpose: Summation kernels that differ only in instruction-level parallelism.
//! Exports: `ScalarVariant`, the `*_scalar` kernels, `parallel_scalar`.
//! Invariants: Every kernel returns the same wrapping u32 sum for the same input.
//! Invariants: Elements past the unroll width are summed serially, never dropped.
use std::fmt;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ScalarVariant {
    Single,
    Unroll2,
    Dual,
    Quad,
    QuadChunks,
    Octo,
    Parallel,
}

impl ScalarVariant {
    pub const ALL: [ScalarVariant; 7] = [
        ScalarVariant::Single,
        ScalarVariant::Unroll2,
        ScalarVariant::Dual,
        ScalarVariant::Quad,
        ScalarVariant::QuadChunks,
        ScalarVariant::Octo,
        ScalarVariant::Parallel,
    ];

    pub fn parse(input: &str) -> Result<Self, Error> {
        match input.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "unroll2" => Ok(Self::Unroll2),
            "dual" => Ok(Self::Dual),
            "quad" => Ok(Self::Quad),
            "quad-chunks" => Ok(Self::QuadChunks),
            "octo" => Ok(Self::Octo),
            "parallel" => Ok(Self::Parallel),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown scalar variant `{}`", input.trim()))
                .with_hint(
                    "Use one of: single, unroll2, dual, quad, quad-chunks, octo, parallel, all.",
                )),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarVariant::Single => "single",
            ScalarVariant::Unroll2 => "unroll2",
            ScalarVariant::Dual => "dual",
            ScalarVariant::Quad => "quad",
            ScalarVariant::QuadChunks => "quad-chunks",
            ScalarVariant::Octo => "octo",
            ScalarVariant::Parallel => "parallel",
        }
    }

    /// `threads` only matters for `Parallel`.
    pub fn sum(self, input: &[u32], threads: usize) -> Result<u32, Error> {
        Ok(match self {
            ScalarVariant::Single => single_scalar(input),
            ScalarVariant::Unroll2 => unroll2_scalar(input),
            ScalarVariant::Dual => dual_scalar(input),
            ScalarVariant::Quad => quad_scalar(input),
            ScalarVariant::QuadChunks => quad_scalar_chunks(input),
            ScalarVariant::Octo => octo_scalar(input),
            ScalarVariant::Parallel => parallel_scalar(input, threads)?,
        })
    }
}

impl fmt::Display for ScalarVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn serial_tail(input: &[u32], from: usize) -> u32 {
    input[from..]
        .iter()
        .fold(0u32, |sum, value| sum.wrapping_add(*value))
}

pub fn single_scalar(input: &[u32]) -> u32 {
    serial_tail(input, 0)
}

/// One accumulator, two adds per iteration.
pub fn unroll2_scalar(input: &[u32]) -> u32 {
    let body = input.len() - input.len() % 2;
    let mut sum = 0u32;
    let mut index = 0;
    while index < body {
        sum = sum.wrapping_add(input[index]);
        sum = sum.wrapping_add(input[index + 1]);
        index += 2;
    }
    sum.wrapping_add(serial_tail(input, body))
}

/// Two independent accumulators, so the adds can retire in parallel.
pub fn dual_scalar(input: &[u32]) -> u32 {
    let body = input.len() - input.len() % 2;
    let (mut a, mut b) = (0u32, 0u32);
    let mut index = 0;
    while index < body {
        a = a.wrapping_add(input[index]);
        b = b.wrapping_add(input[index + 1]);
        index += 2;
    }
    a.wrapping_add(b).wrapping_add(serial_tail(input, body))
}

pub fn quad_scalar(input: &[u32]) -> u32 {
    let body = input.len() - input.len() % 4;
    let (mut a, mut b, mut c, mut d) = (0u32, 0u32, 0u32, 0u32);
    let mut index = 0;
    while index < body {
        a = a.wrapping_add(input[index]);
        b = b.wrapping_add(input[index + 1]);
        c = c.wrapping_add(input[index + 2]);
        d = d.wrapping_add(input[index + 3]);
        index += 4;
    }
    a.wrapping_add(b)
        .wrapping_add(c)
        .wrapping_add(d)
        .wrapping_add(serial_tail(input, body))
}

/// Same shape as `quad_scalar`, written over `chunks_exact` so no index is bounds-checked.
pub fn quad_scalar_chunks(input: &[u32]) -> u32 {
    let chunks = input.chunks_exact(4);
    let tail = chunks.remainder();
    let mut acc = [0u32; 4];
    for chunk in chunks {
        for (lane, value) in acc.iter_mut().zip(chunk) {
            *lane = lane.wrapping_add(*value);
        }
    }
    let mut sum = acc.iter().fold(0u32, |sum, lane| sum.wrapping_add(*lane));
    for value in tail {
        sum = sum.wrapping_add(*value);
    }
    sum
}

pub fn octo_scalar(input: &[u32]) -> u32 {
    let body = input.len() - input.len() % 8;
    let mut acc = [0u32; 8];
    let mut index = 0;
    while index < body {
        acc[0] = acc[0].wrapping_add(input[index]);
        acc[1] = acc[1].wrapping_add(input[index + 1]);
        acc[2] = acc[2].wrapping_add(input[index + 2]);
        acc[3] = acc[3].wrapping_add(input[index + 3]);
        acc[4] = acc[4].wrapping_add(input[index + 4]);
        acc[5] = acc[5].wrapping_add(input[index + 5]);
        acc[6] = acc[6].wrapping_add(input[index + 6]);
        acc[7] = acc[7].wrapping_add(input[index + 7]);
        index += 8;
    }
    acc.iter()
        .fold(0u32, |sum, lane| sum.wrapping_add(*lane))
        .wrapping_add(serial_tail(input, body))
}

/// Splits `input` into at most `threads` contiguous ranges and sums each on its own thread.
pub fn parallel_scalar(input: &[u32], threads: usize) -> Result<u32, Error> {
    if threads == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("parallel sum needs at least one thread"));
    }
    if input.is_empty() {
        return Ok(0);
    }
    let chunk_len = input.len().div_ceil(threads);
    let sum = std::thread::scope(|scope| {
        let handles: Vec<_> = input
            .chunks(chunk_len)
            .map(|part| scope.spawn(move || single_scalar(part)))
            .collect();
        handles.into_iter().try_fold(0u32, |sum, handle| {
            handle.join().map(|part| sum.wrapping_add(part))
        })
    });
    sum.map_err(|_| Error::new(ErrorKind::Internal).with_message("summing thread panicked"))
}

#[cfg(test)]
mod tests {
    use super::{ScalarVariant, parallel_scalar, single_scalar};
    use crate::core::error::ErrorKind;

    fn ramp(len: usize) -> Vec<u32> {
        (0..len as u32).collect()
    }

    #[test]
    fn ramp_sum_matches_closed_form() {
        let input = ramp(4096);
        assert_eq!(single_scalar(&input), 4095 * 4096 / 2);
    }

    #[test]
    fn all_variants_agree_on_ragged_lengths() {
        for len in [0usize, 1, 3, 7, 9, 15, 4096, 4099] {
            let input = ramp(len);
            let expected = single_scalar(&input);
            for variant in ScalarVariant::ALL {
                for threads in [1usize, 2, 4, 7] {
                    assert_eq!(
                        variant.sum(&input, threads).expect("sum"),
                        expected,
                        "{variant} len={len} threads={threads}"
                    );
                }
            }
        }
    }

    #[test]
    fn sums_wrap_instead_of_overflowing() {
        let input = vec![u32::MAX; 9];
        let expected = u32::MAX.wrapping_mul(9);
        for variant in ScalarVariant::ALL {
            assert_eq!(variant.sum(&input, 3).expect("sum"), expected);
        }
    }

    #[test]
    fn parallel_rejects_zero_threads() {
        let err = parallel_scalar(&[1, 2, 3], 0).expect_err("zero threads");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn more_threads_than_elements() {
        assert_eq!(parallel_scalar(&[5, 6], 16).expect("sum"), 11);
    }

    #[test]
    fn variant_parse() {
        assert_eq!(
            ScalarVariant::parse("Quad-Chunks").expect("parse"),
            ScalarVariant::QuadChunks
        );
        assert_eq!(
            ScalarVariant::parse("hex").expect_err("unknown").kind(),
            ErrorKind::Usage
        );
    }
}
