// Process-wide page fault counters.

/// Minor (soft) page faults taken by this process so far; zero where unsupported.
#[cfg(unix)]
pub fn minor_page_faults() -> u64 {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the provided struct.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return 0;
    }
    // SAFETY: rc == 0 means the kernel filled the struct; it was zeroed before.
    let usage = unsafe { usage.assume_init() };
    usage.ru_minflt.max(0) as u64
}

#[cfg(not(unix))]
pub fn minor_page_faults() -> u64 {
    0
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::minor_page_faults;

    #[test]
    fn touching_fresh_pages_faults() {
        // Anonymous maps are never pre-faulted, unlike a reused heap block.
        let mut pages = memmap2::MmapMut::map_anon(256 * 4096).expect("map_anon");
        let before = minor_page_faults();
        for chunk in pages.chunks_mut(4096) {
            chunk[0] = 1;
        }
        std::hint::black_box(&pages);
        assert!(minor_page_faults() > before);
    }
}
