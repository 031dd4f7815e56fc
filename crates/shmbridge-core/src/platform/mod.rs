//! # Platform Queries
//!
//! The few facts about the hosting process the Core module needs from the
//! operating system. Today that is the CPU affinity mask used by yield
//! negotiation.
//!
//! - **Linux**: `sched_getaffinity(2)`
//!   - See: [sched_getaffinity(2) man page](https://man7.org/linux/man-pages/man2/sched_getaffinity.2.html)
//! - **Other unix**: no per-process affinity API; every online CPU is assumed

pub mod affinity;

pub use affinity::{AffinityProbe, FixedAffinity, SystemAffinity};
