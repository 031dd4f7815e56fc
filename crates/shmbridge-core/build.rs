//! Build script for shmbridge-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (`core::mem::offset_of!` = Rust 1.77.0+)
//! - Platform support (process-shared pthread primitives)
//!
//! ## Requirements
//!
//! - **Rust**: 1.77.0 or newer
//! - **Unix**: Linux, macOS or another platform with `PTHREAD_PROCESS_SHARED`
//! - **Windows**: not supported

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    // Header layout assertions use offset_of!, stabilized in 1.77.0
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 77, 0);

        if rustc_version < min_rust_version {
            panic!("shmbridge-core requires Rust {min_rust_version} or newer, found {rustc_version}");
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    // Cargo sets CARGO_CFG_UNIX for every unix target, including cross builds
    if std::env::var_os("CARGO_CFG_UNIX").is_none() {
        println!("cargo:warning=shmbridge-core only provides the agent and controller on unix targets");
    }
}
