//! Purpose: File-read workloads for the repetition tester.
//! Exports: `ReadMethod`, `read_file_once`.
//! Invariants: Each call reads the whole file once and returns its byte length.
//! Invariants: Missing files surface as `NotFound`; other failures as `Io` with the path.
use std::fmt;
use std::fs::File;
use std::hint::black_box;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;

use crate::core::error::{Error, ErrorKind};

const PAGE_BYTES: usize = 4096;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadMethod {
    /// `read` into a buffer that is reused across repetitions.
    Read,
    /// Map the file and touch one byte per page.
    Mmap,
}

impl ReadMethod {
    pub fn parse(input: &str) -> Result<Self, Error> {
        match input.trim() {
            "read" => Ok(Self::Read),
            "mmap" => Ok(Self::Mmap),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message("invalid --method (use read|mmap)")),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReadMethod::Read => "read",
            ReadMethod::Mmap => "mmap",
        }
    }
}

impl fmt::Display for ReadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn file_len(path: &Path) -> Result<u64, Error> {
    std::fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|err| Error::from_io(err, path))
}

/// Reads `path` once with `method`; `buf` keeps its allocation between calls.
pub fn read_file_once(path: &Path, method: ReadMethod, buf: &mut Vec<u8>) -> Result<u64, Error> {
    let mut file = File::open(path).map_err(|err| Error::from_io(err, path))?;
    match method {
        ReadMethod::Read => {
            buf.clear();
            file.read_to_end(buf)
                .map_err(|err| Error::from_io(err, path))?;
            Ok(buf.len() as u64)
        }
        ReadMethod::Mmap => {
            let len = file
                .metadata()
                .map_err(|err| Error::from_io(err, path))?
                .len();
            if len == 0 {
                return Ok(0);
            }
            // SAFETY: the mapping is read-only and dropped before returning; a
            // concurrent truncation is the caller's problem, as with any mmap.
            let map = unsafe { Mmap::map(&file) }.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to map file")
                    .with_path(path)
                    .with_source(err)
            })?;
            let mut touched = 0u8;
            for page in map.chunks(PAGE_BYTES) {
                touched = touched.wrapping_add(page[0]);
            }
            black_box(touched);
            Ok(map.len() as u64)
        }
    }
}
