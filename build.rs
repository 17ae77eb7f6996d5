//! Purpose: Assemble the instruction-throughput loop routines for the host target.
//! Role: Cargo build-script; picks `asm/loops_<arch>.S` and hands it to `cc`.
//! Invariants: Only aarch64 and x86_64 on non-Windows targets get assembly; all others
//! fall back to the portable Rust loops.
//! Invariants: Emits `cfg(perfloops_asm)` exactly when an assembly object is linked.
//! Invariants: Uses only Cargo-provided env vars (e.g. `CARGO_MANIFEST_DIR`).
use std::env;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    println!("cargo:rerun-if-changed=asm/loops_aarch64.S");
    println!("cargo:rerun-if-changed=asm/loops_x86_64.S");
    println!("cargo:rustc-check-cfg=cfg(perfloops_asm)");

    let Some(source) = asm_source_for(&arch, &os) else {
        println!("cargo:warning=no assembly loops for target arch `{arch}` on `{os}`; using portable loops");
        return;
    };

    cc::Build::new()
        .file(manifest_dir.join("asm").join(source))
        .compile("perfloops_asm");

    println!("cargo:rustc-cfg=perfloops_asm");
}

fn asm_source_for(arch: &str, os: &str) -> Option<&'static str> {
    if os == "windows" {
        return None;
    }
    match arch {
        "aarch64" => Some("loops_aarch64.S"),
        "x86_64" => Some("loops_x86_64.S"),
        _ => None,
    }
}
